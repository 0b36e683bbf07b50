//! The consumer capability handed to producers
//!
//! An [`Emitter`] is the serialization point of one subscription. Signals may be
//! pushed from any thread; they are queued and delivered strictly one at a time
//! by whichever thread finds the emitter idle. A push made from inside a
//! consumer call (re-entrant emission) is queued and delivered after the current
//! call returns, never recursively.
//!
//! Cancelling the subscription from another thread waits for a consumer call
//! that is already running, so no call starts once `cancel` has returned.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, ThreadId};

use crate::error::{catch_user, StreamError};
use crate::signal::Signal;
use crate::subscription::Subscription;
use crate::sync::lock;

pub(crate) type Sink<T> = Box<dyn FnMut(Signal<T>) + Send + 'static>;

struct Delivery<T> {
    queue: VecDeque<Signal<T>>,
    draining: bool,
    drainer: Option<ThreadId>,
    done: bool,
}

struct Shared<T> {
    subscription: Subscription,
    delivery: Mutex<Delivery<T>>,
    sink: Mutex<Sink<T>>,
}

impl<T> Shared<T> {
    /// Wait out an in-flight consumer call, then release the consumer.
    ///
    /// A cancel issued by the delivering thread itself (from inside the
    /// consumer) must not wait on its own call.
    fn fence(&self) {
        let current = thread::current().id();
        if lock(&self.delivery).drainer == Some(current) {
            return;
        }
        *lock(&self.sink) = Box::new(|_| {});
    }
}

/// Serialized, terminal-guarded push handle for one subscription
pub struct Emitter<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> Emitter<T> {
    pub(crate) fn new(subscription: Subscription, sink: Sink<T>) -> Self {
        let shared = Arc::new(Shared {
            subscription,
            delivery: Mutex::new(Delivery {
                queue: VecDeque::new(),
                draining: false,
                drainer: None,
                done: false,
            }),
            sink: Mutex::new(sink),
        });
        let fenced: Weak<Shared<T>> = Arc::downgrade(&shared);
        shared.subscription.on_cancel(move || {
            if let Some(shared) = fenced.upgrade() {
                shared.fence();
            }
        });
        Self { shared }
    }

    pub fn next(&self, value: T) {
        self.signal(Signal::Next(value));
    }

    pub fn error(&self, error: StreamError) {
        self.signal(Signal::Error(error));
    }

    pub fn complete(&self) {
        self.signal(Signal::Complete);
    }

    /// Push any signal; ignored after a terminal signal or cancellation
    pub fn signal(&self, signal: Signal<T>) {
        if self.push(signal) {
            self.drain();
        }
    }

    /// True once the subscription is cancelled or a terminal signal was accepted.
    ///
    /// Long-running producers should poll this and stop emitting.
    pub fn is_cancelled(&self) -> bool {
        self.shared.subscription.is_cancelled() || lock(&self.shared.delivery).done
    }

    pub fn subscription(&self) -> &Subscription {
        &self.shared.subscription
    }

    /// Register cleanup to run when the subscription ends, e.g. stopping a timer
    pub fn on_cancel<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.subscription.on_cancel(action);
    }

    /// Enqueue without delivering. Callers holding their own operator lock use
    /// this to fix the order of signals, then call [`Emitter::drain`] unlocked.
    pub(crate) fn push(&self, signal: Signal<T>) -> bool {
        if self.shared.subscription.is_cancelled() {
            return false;
        }
        let mut delivery = lock(&self.shared.delivery);
        if delivery.done {
            return false;
        }
        if signal.is_terminal() {
            delivery.done = true;
        }
        delivery.queue.push_back(signal);
        true
    }

    pub(crate) fn drain(&self) {
        {
            let mut delivery = lock(&self.shared.delivery);
            if delivery.draining {
                return;
            }
            delivery.draining = true;
            delivery.drainer = Some(thread::current().id());
        }

        loop {
            let signal = {
                let mut delivery = lock(&self.shared.delivery);
                if self.shared.subscription.is_cancelled() {
                    delivery.queue.clear();
                    delivery.done = true;
                }
                match delivery.queue.pop_front() {
                    Some(signal) => signal,
                    None => {
                        delivery.draining = false;
                        delivery.drainer = None;
                        return;
                    }
                }
            };

            let terminal = signal.is_terminal();
            let delivered = {
                let mut sink = lock(&self.shared.sink);
                // A cancel that returned while this signal was being dequeued wins.
                if self.shared.subscription.is_cancelled() {
                    continue;
                }
                // A panicking consumer is cut off so later pushes cannot queue up
                // behind it.
                let delivered = catch_user(|| (*sink)(signal));
                if terminal || delivered.is_err() {
                    // Release whatever the consumer captured.
                    *sink = Box::new(|_| {});
                }
                delivered
            };
            if let Err(error) = delivered {
                log::error!(
                    "consumer of subscription {} panicked, cancelling: {}",
                    self.shared.subscription.id(),
                    error
                );
                self.shared.subscription.cancel();
            } else if terminal {
                self.shared.subscription.cancel();
            }
        }
    }
}
