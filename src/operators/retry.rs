//! Resubscribing operators: retry, retry_if, retry_with_policy, retry_when
//!
//! Every downstream subscription owns one [`Resubscriber`] holding its attempt
//! counter. Resubscription requests are handled by an iterative loop: a source
//! that fails synchronously while being subscribed only flags a new request,
//! which the loop already running picks up, so the stack depth does not grow
//! with the number of retries.

use std::sync::{Arc, Mutex};

use crate::emitter::Emitter;
use crate::error::{catch_user, RetryPolicy, StreamError};
use crate::scheduler::SchedulerRef;
use crate::signal::Signal;
use crate::stream::Stream;
use crate::sync::lock;

/// One source failure as seen by a `retry_when` handler
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySignal {
    /// 1-based number of this failure within the subscription
    pub attempt: usize,
    pub error: StreamError,
}

type ErrorHandler<T> = Box<dyn Fn(&Arc<Resubscriber<T>>, StreamError) + Send + Sync + 'static>;

struct LoopState {
    requested: bool,
    running: bool,
    attempt: usize,
}

struct Resubscriber<T> {
    source: Stream<T>,
    downstream: Emitter<T>,
    on_error: ErrorHandler<T>,
    state: Mutex<LoopState>,
}

impl<T: Send + 'static> Resubscriber<T> {
    fn new(source: Stream<T>, downstream: Emitter<T>, on_error: ErrorHandler<T>) -> Arc<Self> {
        Arc::new(Self {
            source,
            downstream,
            on_error,
            state: Mutex::new(LoopState {
                requested: false,
                running: false,
                attempt: 0,
            }),
        })
    }

    fn next_attempt(&self) -> usize {
        let mut state = lock(&self.state);
        state.attempt += 1;
        state.attempt
    }

    /// Ask for one more subscription of the source
    fn request(self: &Arc<Self>) {
        {
            let mut state = lock(&self.state);
            state.requested = true;
            if state.running {
                return;
            }
            state.running = true;
        }

        loop {
            {
                let mut state = lock(&self.state);
                if !state.requested || self.downstream.is_cancelled() {
                    state.running = false;
                    return;
                }
                state.requested = false;
            }
            self.subscribe_once();
        }
    }

    fn subscribe_once(self: &Arc<Self>) {
        let resubscriber = Arc::clone(self);
        let downstream = self.downstream.clone();
        self.source.attach(
            self.downstream.subscription().child(),
            Box::new(move |signal: Signal<T>| match signal {
                Signal::Error(error) => (resubscriber.on_error)(&resubscriber, error),
                other => downstream.signal(other),
            }),
        );
    }
}

impl<T: Send + 'static> Stream<T> {
    /// Resubscribe on error up to `max_retries` times, then forward the last error
    pub fn retry(&self, max_retries: usize) -> Stream<T> {
        self.retry_if(move |attempt, _| attempt <= max_retries)
    }

    /// Resubscribe on error while `predicate(attempt, &error)` holds.
    ///
    /// `attempt` counts the failures of this subscription, starting at 1.
    pub fn retry_if<P>(&self, predicate: P) -> Stream<T>
    where
        P: Fn(usize, &StreamError) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        let source = self.clone();
        Stream::create(move |downstream: Emitter<T>| {
            let predicate = Arc::clone(&predicate);
            let on_error: ErrorHandler<T> = Box::new(move |resubscriber: &Arc<Resubscriber<T>>, error: StreamError| {
                let attempt = resubscriber.next_attempt();
                match catch_user(|| predicate(attempt, &error)) {
                    Ok(true) => {
                        log::debug!("retry attempt {} after error: {}", attempt, error);
                        resubscriber.request();
                    }
                    Ok(false) => resubscriber.downstream.error(error),
                    Err(predicate_error) => resubscriber.downstream.error(predicate_error),
                }
            });
            Resubscriber::new(source.clone(), downstream, on_error).request();
        })
    }

    /// Resubscribe on error following `policy`, waiting its delays on `scheduler`
    pub fn retry_with_policy(&self, policy: RetryPolicy, scheduler: SchedulerRef) -> Stream<T> {
        let source = self.clone();
        Stream::create(move |downstream: Emitter<T>| {
            let policy = policy.clone();
            let scheduler = Arc::clone(&scheduler);
            let on_error: ErrorHandler<T> = Box::new(move |resubscriber: &Arc<Resubscriber<T>>, error: StreamError| {
                let attempt = resubscriber.next_attempt();
                match policy.delay_for(attempt) {
                    None => resubscriber.downstream.error(error),
                    Some(delay) if delay.is_zero() => {
                        log::debug!("retry attempt {} after error: {}", attempt, error);
                        resubscriber.request();
                    }
                    Some(delay) => {
                        log::debug!(
                            "retry attempt {} in {:?} after error: {}",
                            attempt,
                            delay,
                            error
                        );
                        let delayed = Arc::clone(resubscriber);
                        let pending = scheduler.schedule_after(delay, Box::new(move || delayed.request()));
                        resubscriber.downstream.subscription().add(pending);
                    }
                }
            });
            Resubscriber::new(source.clone(), downstream, on_error).request();
        })
    }

    /// Let a control stream decide when to resubscribe.
    ///
    /// `handler` receives the stream of failures and returns the control
    /// stream, which is subscribed before the source. Each control item
    /// resubscribes the source; control completion or error ends the result
    /// with that same signal. A control stream that terminates before the
    /// source's first subscription prevents it entirely.
    pub fn retry_when<X, F>(&self, handler: F) -> Stream<T>
    where
        X: Send + 'static,
        F: Fn(Stream<RetrySignal>) -> Stream<X> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let source = self.clone();
        Stream::create(move |downstream: Emitter<T>| {
            let listeners: Arc<Mutex<Vec<Emitter<RetrySignal>>>> = Arc::new(Mutex::new(Vec::new()));
            let registry = Arc::clone(&listeners);
            let release = Arc::clone(&listeners);
            downstream.on_cancel(move || lock(&release).clear());
            let failures = Stream::create(move |listener: Emitter<RetrySignal>| {
                lock(&registry).push(listener);
            });

            let control = match catch_user(|| handler(failures)) {
                Ok(control) => control,
                Err(error) => {
                    downstream.error(error);
                    return;
                }
            };

            let on_error: ErrorHandler<T> = Box::new(move |resubscriber: &Arc<Resubscriber<T>>, error: StreamError| {
                let attempt = resubscriber.next_attempt();
                log::debug!("failure {} reported to retry handler: {}", attempt, error);
                let active: Vec<Emitter<RetrySignal>> = {
                    let mut listeners = lock(&listeners);
                    listeners.retain(|listener| !listener.is_cancelled());
                    listeners.clone()
                };
                for listener in active {
                    listener.next(RetrySignal {
                        attempt,
                        error: error.clone(),
                    });
                }
            });
            let resubscriber = Resubscriber::new(source.clone(), downstream.clone(), on_error);

            let control_target = Arc::clone(&resubscriber);
            let control_downstream = downstream.clone();
            control.attach(
                downstream.subscription().child(),
                Box::new(move |signal: Signal<X>| match signal {
                    Signal::Next(_) => control_target.request(),
                    Signal::Error(error) => control_downstream.error(error),
                    Signal::Complete => control_downstream.complete(),
                }),
            );

            resubscriber.request();
        })
    }
}
