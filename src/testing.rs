//! Blocking helpers for tests, demos and benchmarks

use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{StreamError, StreamResult};
use crate::signal::Signal;
use crate::stream::Stream;
use crate::subscription::Subscription;
use crate::sync::lock;

/// Records every signal of one subscription and lets a test block until
/// enough of them arrived.
pub struct TestObserver<T> {
    signals: Arc<(Mutex<Vec<Signal<T>>>, Condvar)>,
    subscription: Subscription,
}

impl<T: Clone + Send + 'static> TestObserver<T> {
    /// Subscribe to `stream` and start recording
    pub fn subscribe(stream: &Stream<T>) -> Self {
        let signals = Arc::new((Mutex::new(Vec::new()), Condvar::new()));
        let recorder = Arc::clone(&signals);
        let subscription = stream.subscribe_signals(move |signal: Signal<T>| {
            let (seen, changed) = &*recorder;
            lock(seen).push(signal);
            changed.notify_all();
        });
        Self {
            signals,
            subscription,
        }
    }

    fn wait_until<P>(&self, timeout: Duration, done: P) -> bool
    where
        P: Fn(&[Signal<T>]) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let (seen, changed) = &*self.signals;
        let mut guard = lock(seen);
        loop {
            if done(guard.as_slice()) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = match changed.wait_timeout(guard, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Block until a terminal signal arrives; false on timeout
    pub fn await_terminal(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, |signals| signals.iter().any(Signal::is_terminal))
    }

    /// Block until at least `count` items arrived; false on timeout
    pub fn await_count(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |signals| {
            signals.iter().filter(|signal| matches!(signal, Signal::Next(_))).count() >= count
        })
    }

    pub fn signals(&self) -> Vec<Signal<T>> {
        lock(&self.signals.0).clone()
    }

    pub fn values(&self) -> Vec<T> {
        lock(&self.signals.0)
            .iter()
            .filter_map(|signal| match signal {
                Signal::Next(value) => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn next_count(&self) -> usize {
        lock(&self.signals.0)
            .iter()
            .filter(|signal| matches!(signal, Signal::Next(_)))
            .count()
    }

    pub fn terminal_count(&self) -> usize {
        lock(&self.signals.0).iter().filter(|signal| signal.is_terminal()).count()
    }

    pub fn error(&self) -> Option<StreamError> {
        lock(&self.signals.0).iter().find_map(|signal| match signal {
            Signal::Error(error) => Some(error.clone()),
            _ => None,
        })
    }

    pub fn is_completed(&self) -> bool {
        lock(&self.signals.0).iter().any(|signal| matches!(signal, Signal::Complete))
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    pub fn cancel(&self) {
        self.subscription.cancel();
    }
}

impl<T: Send + 'static> Stream<T> {
    /// Subscribe a [`TestObserver`]
    pub fn test(&self) -> TestObserver<T>
    where
        T: Clone,
    {
        TestObserver::subscribe(self)
    }

    /// Subscribe and block the calling thread until the stream terminates.
    ///
    /// Returns every item on completion, or the error. Must not be called from
    /// the only thread able to drive the stream's producer.
    pub fn blocking_collect(&self) -> StreamResult<Vec<T>> {
        let (tx, rx) = mpsc::channel();
        let _subscription = self.subscribe_signals(move |signal: Signal<T>| {
            let _ = tx.send(signal);
        });
        let mut items = Vec::new();
        for signal in rx {
            match signal {
                Signal::Next(value) => items.push(value),
                Signal::Error(error) => return Err(error),
                Signal::Complete => return Ok(items),
            }
        }
        Err(StreamError::IllegalState(
            "stream was disposed without a terminal signal".to_string(),
        ))
    }

    /// `blocking_collect` giving up after `timeout` with `StreamError::Timeout`
    pub fn blocking_collect_timeout(&self, timeout: Duration) -> StreamResult<Vec<T>> {
        let deadline = Instant::now() + timeout;
        let (tx, rx) = mpsc::channel();
        let subscription = self.subscribe_signals(move |signal: Signal<T>| {
            let _ = tx.send(signal);
        });
        let mut items = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(Signal::Next(value)) => items.push(value),
                Ok(Signal::Error(error)) => return Err(error),
                Ok(Signal::Complete) => return Ok(items),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    subscription.cancel();
                    return Err(StreamError::Timeout);
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(StreamError::IllegalState(
                        "stream was disposed without a terminal signal".to_string(),
                    ))
                }
            }
        }
    }
}
