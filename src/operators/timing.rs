//! Time-based operators: timeout and delay

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::emitter::Emitter;
use crate::error::StreamError;
use crate::scheduler::SchedulerRef;
use crate::signal::Signal;
use crate::stream::Stream;
use crate::subscription::Subscription;
use crate::sync::lock;

struct TimeoutState {
    generation: u64,
    timer: Option<Subscription>,
    finished: bool,
}

struct TimeoutWatch<T> {
    state: Mutex<TimeoutState>,
    duration: Duration,
    scheduler: SchedulerRef,
    upstream: Subscription,
    downstream: Emitter<T>,
}

impl<T: Send + 'static> TimeoutWatch<T> {
    /// Start a timer for `generation`; it only fires if no item arrived since
    fn arm(self: &Arc<Self>, generation: u64) {
        let watch = Arc::clone(self);
        let timer = self.scheduler.schedule_after(
            self.duration,
            Box::new(move || watch.fire(generation)),
        );
        self.downstream.subscription().add(timer.clone());

        let mut state = lock(&self.state);
        if state.finished || state.generation != generation {
            drop(state);
            timer.cancel();
        } else {
            state.timer = Some(timer);
        }
    }

    fn fire(&self, generation: u64) {
        {
            let mut state = lock(&self.state);
            if state.finished || state.generation != generation {
                return;
            }
            state.finished = true;
            state.timer = None;
        }
        log::debug!("no signal within {:?}, timing out", self.duration);
        self.upstream.cancel();
        self.downstream.error(StreamError::Timeout);
    }

    fn on_next(self: &Arc<Self>, value: T) {
        let (generation, previous) = {
            let mut state = lock(&self.state);
            if state.finished {
                return;
            }
            state.generation += 1;
            (state.generation, state.timer.take())
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
        self.downstream.next(value);
        self.arm(generation);
    }

    fn on_terminal(&self, terminal: Signal<T>) {
        let timer = {
            let mut state = lock(&self.state);
            if state.finished {
                return;
            }
            state.finished = true;
            state.timer.take()
        };
        if let Some(timer) = timer {
            timer.cancel();
        }
        self.downstream.signal(terminal);
    }
}

impl<T: Send + 'static> Stream<T> {
    /// Fail with `StreamError::Timeout` when no item arrives within `duration`.
    ///
    /// The timer is armed at subscription and re-armed after every item. When
    /// it fires the source is cancelled.
    pub fn timeout(&self, duration: Duration, scheduler: SchedulerRef) -> Stream<T> {
        let source = self.clone();
        Stream::create(move |downstream: Emitter<T>| {
            let watch = Arc::new(TimeoutWatch {
                state: Mutex::new(TimeoutState {
                    generation: 0,
                    timer: None,
                    finished: false,
                }),
                duration,
                scheduler: Arc::clone(&scheduler),
                upstream: downstream.subscription().child(),
                downstream: downstream.clone(),
            });
            watch.arm(0);

            let sink_watch = Arc::clone(&watch);
            source.attach(
                watch.upstream.clone(),
                Box::new(move |signal: Signal<T>| match signal {
                    Signal::Next(value) => sink_watch.on_next(value),
                    terminal => sink_watch.on_terminal(terminal),
                }),
            );
        })
    }

    /// Shift items and completion later by `delay`, keeping their order.
    ///
    /// Errors are not delayed: they discard any items still waiting and are
    /// delivered at once.
    pub fn delay(&self, delay: Duration, scheduler: SchedulerRef) -> Stream<T> {
        self.lift(move |downstream: Emitter<T>| {
            let scheduler = Arc::clone(&scheduler);
            let waiting: Arc<Mutex<VecDeque<Signal<T>>>> = Arc::new(Mutex::new(VecDeque::new()));
            Box::new(move |signal: Signal<T>| match signal {
                Signal::Error(error) => {
                    {
                        let mut waiting = lock(&waiting);
                        waiting.clear();
                        downstream.push(Signal::Error(error));
                    }
                    downstream.drain();
                }
                delayed => {
                    lock(&waiting).push_back(delayed);
                    // Every timer releases the oldest waiting signal, so the
                    // release order is the arrival order whichever timer runs first.
                    let waiting = Arc::clone(&waiting);
                    let release = downstream.clone();
                    let pending = scheduler.schedule_after(
                        delay,
                        Box::new(move || {
                            {
                                let mut waiting = lock(&waiting);
                                if let Some(signal) = waiting.pop_front() {
                                    release.push(signal);
                                }
                            }
                            release.drain();
                        }),
                    );
                    downstream.subscription().add(pending);
                }
            })
        })
    }
}
