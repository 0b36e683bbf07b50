//! GroupBy: split one stream into keyed sub-streams
//!
//! Groups are unicast: the first subscriber receives everything routed to the
//! group (including items buffered before it arrived), a second subscriber is
//! rejected with `StreamError::IllegalState`. Buffering before subscription is
//! bounded by [`GroupBufferConfig`].
//!
//! The source stays subscribed while the outer stream or any subscribed group
//! is still live. Once all of them are gone the source is cancelled and groups
//! that were never subscribed are completed, so a late subscriber still gets a
//! terminal signal.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::ops::Deref;
use std::sync::{Arc, Mutex, Weak};

use crate::config::{GroupBufferConfig, OverflowStrategy};
use crate::emitter::Emitter;
use crate::error::{catch_user, StreamError};
use crate::signal::Signal;
use crate::stream::Stream;
use crate::subscription::Subscription;
use crate::sync::lock;

/// A stream of the items sharing one key
#[derive(Clone)]
pub struct GroupedStream<K, T> {
    key: K,
    stream: Stream<T>,
}

impl<K, T> GroupedStream<K, T> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn into_stream(self) -> Stream<T> {
        self.stream
    }
}

impl<K, T> Deref for GroupedStream<K, T> {
    type Target = Stream<T>;

    fn deref(&self) -> &Stream<T> {
        &self.stream
    }
}

impl<K: fmt::Debug, T> fmt::Debug for GroupedStream<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupedStream").field("key", &self.key).finish()
    }
}

struct GroupState<T> {
    buffer: VecDeque<T>,
    subscriber: Option<Emitter<T>>,
    subscribed: bool,
    terminal: Option<Signal<T>>,
    dropped: usize,
}

/// Keeps the shared source alive on behalf of subscribed groups
trait SourceLease: Send + Sync {
    fn acquire(&self);
    fn release(&self);
}

struct Group<T> {
    label: String,
    config: GroupBufferConfig,
    lease: Weak<dyn SourceLease>,
    state: Mutex<GroupState<T>>,
}

impl<T: Send + 'static> Group<T> {
    fn new(label: String, config: GroupBufferConfig, lease: Weak<dyn SourceLease>) -> Arc<Self> {
        Arc::new(Self {
            label,
            config,
            lease,
            state: Mutex::new(GroupState {
                buffer: VecDeque::new(),
                subscriber: None,
                subscribed: false,
                terminal: None,
                dropped: 0,
            }),
        })
    }

    fn stream(self: &Arc<Self>) -> Stream<T> {
        let group = Arc::clone(self);
        Stream::create(move |emitter: Emitter<T>| group.attach(emitter))
    }

    fn attach(self: &Arc<Self>, emitter: Emitter<T>) {
        {
            let mut state = lock(&self.state);
            if state.subscribed {
                drop(state);
                emitter.error(StreamError::IllegalState(format!(
                    "group {} already has a subscriber",
                    self.label
                )));
                return;
            }
            state.subscribed = true;
            if let Some(lease) = self.lease.upgrade() {
                lease.acquire();
            }
            while let Some(item) = state.buffer.pop_front() {
                emitter.push(Signal::Next(item));
            }
            match state.terminal.take() {
                Some(terminal) => {
                    emitter.push(terminal);
                }
                None => state.subscriber = Some(emitter.clone()),
            }
        }

        let group: Weak<Group<T>> = Arc::downgrade(self);
        let lease = self.lease.clone();
        emitter.on_cancel(move || {
            if let Some(group) = group.upgrade() {
                lock(&group.state).subscriber = None;
            }
            if let Some(lease) = lease.upgrade() {
                lease.release();
            }
        });
        emitter.drain();
    }

    fn route(&self, item: T) -> Result<(), StreamError> {
        let subscriber = {
            let mut state = lock(&self.state);
            match state.subscriber.clone() {
                Some(subscriber) => {
                    subscriber.push(Signal::Next(item));
                    subscriber
                }
                None => {
                    if state.subscribed {
                        // The subscriber went away; the group is discarded.
                        return Ok(());
                    }
                    if state.buffer.len() >= self.config.capacity {
                        match self.config.overflow {
                            OverflowStrategy::DropOldest => {
                                state.buffer.pop_front();
                                state.buffer.push_back(item);
                            }
                            OverflowStrategy::DropNewest => {}
                            OverflowStrategy::Error => return Err(StreamError::BackpressureOverflow),
                        }
                        state.dropped += 1;
                        if state.dropped == 1 {
                            log::warn!(
                                "group {} buffer full ({} items) without a subscriber, dropping items",
                                self.label,
                                self.config.capacity
                            );
                        }
                    } else {
                        state.buffer.push_back(item);
                    }
                    return Ok(());
                }
            }
        };
        subscriber.drain();
        Ok(())
    }

    fn terminate(&self, terminal: Signal<T>) {
        let subscriber = {
            let mut state = lock(&self.state);
            match state.subscriber.take() {
                Some(subscriber) => {
                    subscriber.push(terminal);
                    subscriber
                }
                None => {
                    if !state.subscribed {
                        state.terminal = Some(terminal);
                    }
                    return;
                }
            }
        };
        subscriber.drain();
    }
}

struct Liveness {
    outer_cancelled: bool,
    subscribed_groups: usize,
}

/// Per-subscription state shared by the source sink, the outer stream and
/// every group
struct GroupBy<K, T> {
    upstream: Subscription,
    groups: Mutex<HashMap<K, Arc<Group<T>>>>,
    liveness: Mutex<Liveness>,
}

impl<K, T> GroupBy<K, T>
where
    K: Eq + Hash + Send + 'static,
    T: Send + 'static,
{
    fn take_groups(&self) -> Vec<Arc<Group<T>>> {
        lock(&self.groups).drain().map(|(_, group)| group).collect()
    }

    /// Close every open group with `error`, or complete them when `None`
    fn terminate_all(&self, error: Option<&StreamError>) {
        for group in self.take_groups() {
            group.terminate(match error {
                Some(error) => Signal::Error(error.clone()),
                None => Signal::Complete,
            });
        }
    }

    fn outer_cancelled(&self) {
        let idle = {
            let mut liveness = lock(&self.liveness);
            liveness.outer_cancelled = true;
            liveness.subscribed_groups == 0
        };
        if idle {
            self.shut_down();
        }
    }

    fn shut_down(&self) {
        log::trace!("group_by source {} released", self.upstream.id());
        self.upstream.cancel();
        self.terminate_all(None);
    }
}

impl<K, T> SourceLease for GroupBy<K, T>
where
    K: Eq + Hash + Send + 'static,
    T: Send + 'static,
{
    fn acquire(&self) {
        lock(&self.liveness).subscribed_groups += 1;
    }

    fn release(&self) {
        let idle = {
            let mut liveness = lock(&self.liveness);
            liveness.subscribed_groups = liveness.subscribed_groups.saturating_sub(1);
            liveness.outer_cancelled && liveness.subscribed_groups == 0
        };
        if idle {
            self.shut_down();
        }
    }
}

impl<T: Send + 'static> Stream<T> {
    /// Split the stream by key with the default group buffer configuration
    pub fn group_by<K, F>(&self, key_fn: F) -> Stream<GroupedStream<K, T>>
    where
        K: Clone + Eq + Hash + fmt::Debug + Send + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.group_by_with(GroupBufferConfig::default(), key_fn)
    }

    /// Split the stream by key.
    ///
    /// A new key emits a [`GroupedStream`] before its first item is routed.
    /// Completion or error of the source is propagated to every open group and
    /// then downstream. Items for a group nobody subscribed to yet are held up
    /// to `config.capacity`, after which `config.overflow` applies.
    ///
    /// Cancelling the outer stream does not cut off groups already being
    /// consumed: they keep receiving items until the source ends or their own
    /// subscriber cancels. Keys first seen after the outer cancel are dropped.
    pub fn group_by_with<K, F>(&self, config: GroupBufferConfig, key_fn: F) -> Stream<GroupedStream<K, T>>
    where
        K: Clone + Eq + Hash + fmt::Debug + Send + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        let key_fn = Arc::new(key_fn);
        let source = self.clone();
        Stream::create(move |downstream: Emitter<GroupedStream<K, T>>| {
            let key_fn = Arc::clone(&key_fn);
            let config = config.clone();
            let state = Arc::new(GroupBy {
                upstream: Subscription::new(),
                groups: Mutex::new(HashMap::new()),
                liveness: Mutex::new(Liveness {
                    outer_cancelled: false,
                    subscribed_groups: 0,
                }),
            });
            let lease: Arc<dyn SourceLease> = state.clone();
            let lease = Arc::downgrade(&lease);

            let outer = Arc::clone(&state);
            downstream.on_cancel(move || outer.outer_cancelled());

            let shared = Arc::clone(&state);
            let fail = move |downstream: &Emitter<GroupedStream<K, T>>, error: StreamError| {
                shared.upstream.cancel();
                shared.terminate_all(Some(&error));
                downstream.error(error);
            };

            let sink_state = Arc::clone(&state);
            let sink_downstream = downstream.clone();
            let upstream = state.upstream.clone();
            source.attach(
                upstream,
                Box::new(move |signal: Signal<T>| match signal {
                    Signal::Next(item) => {
                        let key = match catch_user(|| key_fn(&item)) {
                            Ok(key) => key,
                            Err(error) => return fail(&sink_downstream, error),
                        };
                        let existing = lock(&sink_state.groups).get(&key).cloned();
                        let group = match existing {
                            Some(group) => group,
                            None => {
                                if sink_downstream.is_cancelled() {
                                    return;
                                }
                                let group = Group::new(format!("{:?}", key), config.clone(), lease.clone());
                                lock(&sink_state.groups).insert(key.clone(), Arc::clone(&group));
                                sink_downstream.next(GroupedStream {
                                    key,
                                    stream: group.stream(),
                                });
                                group
                            }
                        };
                        if let Err(error) = group.route(item) {
                            fail(&sink_downstream, error);
                        }
                    }
                    Signal::Error(error) => {
                        sink_state.terminate_all(Some(&error));
                        sink_downstream.error(error);
                    }
                    Signal::Complete => {
                        sink_state.terminate_all(None);
                        sink_downstream.complete();
                    }
                }),
            );
        })
    }
}
