//! Multi-source operators: zip, merge, concat

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::constructors::{empty, from_iter};
use crate::emitter::Emitter;
use crate::error::{catch_user, StreamError};
use crate::signal::Signal;
use crate::stream::Stream;
use crate::sync::lock;

struct ZipState<T> {
    queues: Vec<VecDeque<T>>,
    done: Vec<bool>,
    terminated: bool,
}

impl<T> ZipState<T> {
    /// A completed source with nothing buffered means no further tuple is possible
    fn exhausted(&self) -> bool {
        self.done
            .iter()
            .zip(&self.queues)
            .any(|(done, queue)| *done && queue.is_empty())
    }
}

/// Pair items position by position across all sources, one `Vec` per position.
///
/// Tuples are pushed to the downstream emitter while the zip lock is held so
/// their order matches the order they became complete.
fn zip_vectors<T: Send + 'static>(sources: Vec<Stream<T>>) -> Stream<Vec<T>> {
    Stream::create(move |downstream: Emitter<Vec<T>>| {
        if sources.is_empty() {
            downstream.complete();
            return;
        }
        let state = Arc::new(Mutex::new(ZipState {
            queues: sources.iter().map(|_| VecDeque::new()).collect(),
            done: vec![false; sources.len()],
            terminated: false,
        }));

        for (index, source) in sources.iter().enumerate() {
            if downstream.is_cancelled() {
                return;
            }
            let state = Arc::clone(&state);
            let sink_downstream = downstream.clone();
            source.attach(
                downstream.subscription().child(),
                Box::new(move |signal: Signal<T>| {
                    match signal {
                        Signal::Next(value) => {
                            let mut state = lock(&state);
                            if state.terminated {
                                return;
                            }
                            state.queues[index].push_back(value);
                            while state.queues.iter().all(|queue| !queue.is_empty()) {
                                let tuple: Vec<T> =
                                    state.queues.iter_mut().filter_map(VecDeque::pop_front).collect();
                                sink_downstream.push(Signal::Next(tuple));
                            }
                            if state.exhausted() {
                                state.terminated = true;
                                sink_downstream.push(Signal::Complete);
                            }
                        }
                        Signal::Error(error) => {
                            let mut state = lock(&state);
                            if state.terminated {
                                return;
                            }
                            state.terminated = true;
                            sink_downstream.push(Signal::Error(error));
                        }
                        Signal::Complete => {
                            let mut state = lock(&state);
                            state.done[index] = true;
                            if !state.terminated && state.exhausted() {
                                state.terminated = true;
                                sink_downstream.push(Signal::Complete);
                            }
                        }
                    }
                    sink_downstream.drain();
                }),
            );
        }
    })
}

/// Combine the n-th items of every source with `combiner`.
///
/// Completes as soon as some completed source has no buffered item left, so the
/// shortest source bounds the output length. Any error fails fast.
pub fn zip_all<T, R, F>(sources: Vec<Stream<T>>, combiner: F) -> Stream<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(Vec<T>) -> R + Send + Sync + 'static,
{
    zip_vectors(sources).map(combiner)
}

/// Merge all sources concurrently; completes when every source has completed
pub fn merge<T: Send + 'static>(sources: Vec<Stream<T>>) -> Stream<T> {
    if sources.is_empty() {
        return empty();
    }
    from_iter(sources).flat_map(|source: Stream<T>| source)
}

/// Subscribe to the sources one after another
pub fn concat<T: Send + 'static>(sources: Vec<Stream<T>>) -> Stream<T> {
    if sources.is_empty() {
        return empty();
    }
    from_iter(sources).concat_map(|source: Stream<T>| source)
}

enum Side<A, B> {
    Left(A),
    Right(B),
}

impl<T: Send + 'static> Stream<T> {
    /// Pair items of `self` and `other` position by position through `combiner`
    pub fn zip_with<B, R, F>(&self, other: &Stream<B>, combiner: F) -> Stream<R>
    where
        B: Send + 'static,
        R: Send + 'static,
        F: Fn(T, B) -> R + Send + Sync + 'static,
    {
        let combiner = Arc::new(combiner);
        let sides = vec![
            self.map(Side::<T, B>::Left),
            other.map(Side::<T, B>::Right),
        ];
        zip_vectors(sides).lift(move |downstream: Emitter<R>| {
            let combiner = Arc::clone(&combiner);
            Box::new(move |signal: Signal<Vec<Side<T, B>>>| match signal {
                Signal::Next(mut pair) => {
                    let right = pair.pop();
                    let left = pair.pop();
                    match (left, right) {
                        (Some(Side::Left(a)), Some(Side::Right(b))) => {
                            match catch_user(|| combiner(a, b)) {
                                Ok(combined) => downstream.next(combined),
                                Err(error) => downstream.error(error),
                            }
                        }
                        _ => downstream.error(StreamError::IllegalState(
                            "zip produced a malformed pair".to_string(),
                        )),
                    }
                }
                Signal::Error(error) => downstream.error(error),
                Signal::Complete => downstream.complete(),
            })
        })
    }

    /// Pair items of `self` and `other` into tuples
    pub fn zip<B: Send + 'static>(&self, other: &Stream<B>) -> Stream<(T, B)> {
        self.zip_with(other, |a, b| (a, b))
    }

    /// Merge with another stream
    pub fn merge_with(&self, other: &Stream<T>) -> Stream<T> {
        merge(vec![self.clone(), other.clone()])
    }

    /// Continue with `other` once this stream completes
    pub fn concat_with(&self, other: &Stream<T>) -> Stream<T> {
        concat(vec![self.clone(), other.clone()])
    }
}
