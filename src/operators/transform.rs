//! Synchronous per-item operators
//!
//! Every user function runs under `catch_user`; a returned `Err` or a panic is
//! delivered downstream as `StreamError::UserFunction`, which also cancels the
//! upstream subscription.

use std::fmt;
use std::sync::Arc;

use crate::error::{catch_user, StreamError};
use crate::signal::Signal;
use crate::stream::Stream;

impl<T: Send + 'static> Stream<T> {
    /// Transform every item
    pub fn map<U, F>(&self, f: F) -> Stream<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.lift(move |downstream| {
            let f = Arc::clone(&f);
            Box::new(move |signal: Signal<T>| match signal {
                Signal::Next(value) => match catch_user(|| f(value)) {
                    Ok(mapped) => downstream.next(mapped),
                    Err(error) => downstream.error(error),
                },
                Signal::Error(error) => downstream.error(error),
                Signal::Complete => downstream.complete(),
            })
        })
    }

    /// Transform every item with a fallible function; the first `Err` fails the stream
    pub fn try_map<U, E, F>(&self, f: F) -> Stream<U>
    where
        U: Send + 'static,
        E: fmt::Display,
        F: Fn(T) -> Result<U, E> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.lift(move |downstream| {
            let f = Arc::clone(&f);
            Box::new(move |signal: Signal<T>| match signal {
                Signal::Next(value) => match catch_user(|| f(value)) {
                    Ok(Ok(mapped)) => downstream.next(mapped),
                    Ok(Err(e)) => downstream.error(StreamError::UserFunction(e.to_string())),
                    Err(error) => downstream.error(error),
                },
                Signal::Error(error) => downstream.error(error),
                Signal::Complete => downstream.complete(),
            })
        })
    }

    /// Keep items matching `predicate`
    pub fn filter<F>(&self, predicate: F) -> Stream<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        self.lift(move |downstream| {
            let predicate = Arc::clone(&predicate);
            Box::new(move |signal: Signal<T>| match signal {
                Signal::Next(value) => match catch_user(|| predicate(&value)) {
                    Ok(true) => downstream.next(value),
                    Ok(false) => {}
                    Err(error) => downstream.error(error),
                },
                Signal::Error(error) => downstream.error(error),
                Signal::Complete => downstream.complete(),
            })
        })
    }

    /// Emit every intermediate accumulator value
    pub fn scan<A, F>(&self, init: A, f: F) -> Stream<A>
    where
        A: Clone + Send + Sync + 'static,
        F: Fn(A, T) -> A + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.lift(move |downstream| {
            let f = Arc::clone(&f);
            let mut acc = Some(init.clone());
            Box::new(move |signal: Signal<T>| match signal {
                Signal::Next(value) => {
                    let Some(current) = acc.take() else { return };
                    match catch_user(|| f(current, value)) {
                        Ok(next) => {
                            acc = Some(next.clone());
                            downstream.next(next);
                        }
                        Err(error) => downstream.error(error),
                    }
                }
                Signal::Error(error) => downstream.error(error),
                Signal::Complete => downstream.complete(),
            })
        })
    }

    /// Accumulate every item and emit the final value on completion
    pub fn fold<A, F>(&self, init: A, f: F) -> Stream<A>
    where
        A: Clone + Send + Sync + 'static,
        F: Fn(A, T) -> A + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.lift(move |downstream| {
            let f = Arc::clone(&f);
            let mut acc = Some(init.clone());
            Box::new(move |signal: Signal<T>| match signal {
                Signal::Next(value) => {
                    let Some(current) = acc.take() else { return };
                    match catch_user(|| f(current, value)) {
                        Ok(next) => acc = Some(next),
                        Err(error) => downstream.error(error),
                    }
                }
                Signal::Error(error) => downstream.error(error),
                Signal::Complete => {
                    if let Some(result) = acc.take() {
                        downstream.next(result);
                    }
                    downstream.complete();
                }
            })
        })
    }

    /// Combine items pairwise; an empty source completes without a value
    pub fn reduce<F>(&self, f: F) -> Stream<T>
    where
        F: Fn(T, T) -> T + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.lift(move |downstream| {
            let f = Arc::clone(&f);
            let mut acc: Option<T> = None;
            Box::new(move |signal: Signal<T>| match signal {
                Signal::Next(value) => {
                    let combined = match acc.take() {
                        None => Ok(value),
                        Some(current) => catch_user(|| f(current, value)),
                    };
                    match combined {
                        Ok(next) => acc = Some(next),
                        Err(error) => downstream.error(error),
                    }
                }
                Signal::Error(error) => downstream.error(error),
                Signal::Complete => {
                    if let Some(result) = acc.take() {
                        downstream.next(result);
                    }
                    downstream.complete();
                }
            })
        })
    }

    /// Gather every item into one `Vec`, emitted on completion
    pub fn collect(&self) -> Stream<Vec<T>> {
        self.lift(|downstream| {
            let mut items = Vec::new();
            Box::new(move |signal: Signal<T>| match signal {
                Signal::Next(value) => items.push(value),
                Signal::Error(error) => downstream.error(error),
                Signal::Complete => {
                    downstream.next(std::mem::take(&mut items));
                    downstream.complete();
                }
            })
        })
    }

    /// Emit the number of items on completion
    pub fn count(&self) -> Stream<usize> {
        self.lift(|downstream| {
            let mut count = 0usize;
            Box::new(move |signal: Signal<T>| match signal {
                Signal::Next(_) => count += 1,
                Signal::Error(error) => downstream.error(error),
                Signal::Complete => {
                    downstream.next(count);
                    downstream.complete();
                }
            })
        })
    }

    /// Emit the first `n` items, then complete and cancel upstream
    pub fn take(&self, n: usize) -> Stream<T> {
        let source = self.clone();
        Stream::create(move |downstream| {
            if n == 0 {
                downstream.complete();
                return;
            }
            let sink_downstream = downstream.clone();
            let mut remaining = n;
            source.attach(
                downstream.subscription().child(),
                Box::new(move |signal: Signal<T>| match signal {
                    Signal::Next(value) => {
                        if remaining == 0 {
                            return;
                        }
                        remaining -= 1;
                        sink_downstream.next(value);
                        if remaining == 0 {
                            sink_downstream.complete();
                        }
                    }
                    terminal => sink_downstream.signal(terminal),
                }),
            );
        })
    }

    /// Drop the first `n` items
    pub fn skip(&self, n: usize) -> Stream<T> {
        self.lift(move |downstream| {
            let mut remaining = n;
            Box::new(move |signal: Signal<T>| match signal {
                Signal::Next(value) => {
                    if remaining > 0 {
                        remaining -= 1;
                    } else {
                        downstream.next(value);
                    }
                }
                terminal => downstream.signal(terminal),
            })
        })
    }

    /// Observe every signal without altering it
    pub fn do_on_signal<F>(&self, observer: F) -> Stream<T>
    where
        F: Fn(&Signal<T>) + Send + Sync + 'static,
    {
        let observer = Arc::new(observer);
        self.lift(move |downstream| {
            let observer = Arc::clone(&observer);
            Box::new(move |signal: Signal<T>| match catch_user(|| observer(&signal)) {
                Ok(()) => downstream.signal(signal),
                Err(error) => downstream.error(error),
            })
        })
    }

    /// Log every signal at info level under `label`
    pub fn log_signals(&self, label: &str) -> Stream<T>
    where
        T: fmt::Debug,
    {
        let label = label.to_string();
        self.do_on_signal(move |signal| match signal {
            Signal::Next(value) => log::info!("[{}] next: {:?}", label, value),
            Signal::Error(error) => log::info!("[{}] error: {}", label, error),
            Signal::Complete => log::info!("[{}] complete", label),
        })
    }
}
