//! Subscription handles
//!
//! A [`Subscription`] owns the live state of one subscribe call: a cancellation
//! flag plus every resource that must be released with it (upstream
//! subscriptions, inner subscriptions of merge operators, scheduled work).
//! Cancelling is idempotent and cascades to all children. A child that is
//! disposed on its own detaches from its parent so long-lived parents do not
//! accumulate finished children.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::sync::lock;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

enum Resource {
    Child(Subscription),
    Teardown(Box<dyn FnOnce() + Send + 'static>),
}

struct Inner {
    id: u64,
    cancelled: AtomicBool,
    resources: Mutex<Vec<Resource>>,
    parent: Mutex<Option<Weak<Inner>>>,
}

/// Cancellable handle for one consumer-to-producer link
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<Inner>,
}

impl Subscription {
    /// Create a new, active subscription with no resources
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                cancelled: AtomicBool::new(false),
                resources: Mutex::new(Vec::new()),
                parent: Mutex::new(None),
            }),
        }
    }

    /// Process-unique identifier, used in log output
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether this subscription was cancelled or reached a terminal signal
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Cancel this subscription and everything it owns.
    ///
    /// Once this returns no consumer call starts for this subscription.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        log::trace!("subscription {} cancelled", self.inner.id);

        let resources = std::mem::take(&mut *lock(&self.inner.resources));
        for resource in resources {
            match resource {
                Resource::Child(child) => child.cancel(),
                Resource::Teardown(action) => action(),
            }
        }

        let parent = lock(&self.inner.parent).take();
        if let Some(parent) = parent.and_then(|weak| weak.upgrade()) {
            lock(&parent.resources).retain(|resource| match resource {
                Resource::Child(child) => child.inner.id != self.inner.id,
                Resource::Teardown(_) => true,
            });
        }
    }

    /// Create a child subscription owned by this one
    pub fn child(&self) -> Subscription {
        let child = Subscription::new();
        self.add(child.clone());
        child
    }

    /// Make `child` owned by this subscription: cancelling `self` cancels it.
    ///
    /// If `self` is already cancelled the child is cancelled immediately.
    pub fn add(&self, child: Subscription) {
        if child.is_cancelled() {
            return;
        }
        {
            let mut resources = lock(&self.inner.resources);
            if !self.is_cancelled() {
                *lock(&child.inner.parent) = Some(Arc::downgrade(&self.inner));
                resources.push(Resource::Child(child));
                return;
            }
        }
        child.cancel();
    }

    /// Register an action to run on cancellation (runs at once if already cancelled)
    pub fn on_cancel<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut resources = lock(&self.inner.resources);
            if !self.is_cancelled() {
                resources.push(Resource::Teardown(Box::new(action)));
                return;
            }
        }
        action();
    }

    #[cfg(test)]
    fn resource_count(&self) -> usize {
        lock(&self.inner.resources).len()
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.inner.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
