//! FlatMap / ConcatMap merge coordinator
//!
//! Each subscription gets one [`Coordinator`] holding the pending source items,
//! the number of active inner subscriptions and the completion flags behind a
//! single mutex. Inner `Next` signals go straight to the serialized downstream
//! emitter, so inners interleave freely. Starting inners happens in an
//! iterative drain loop: an inner that completes synchronously while being
//! started only updates the state, and the loop already running picks up the
//! next pending item.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::config::RxConfig;
use crate::emitter::Emitter;
use crate::error::{catch_user, StreamError};
use crate::signal::Signal;
use crate::stream::Stream;
use crate::sync::lock;

type NextMapper<T, U> = Arc<dyn Fn(T) -> Stream<U> + Send + Sync + 'static>;
type ErrorMapper<U> = Arc<dyn Fn(StreamError) -> Stream<U> + Send + Sync + 'static>;
type CompleteMapper<U> = Arc<dyn Fn() -> Stream<U> + Send + Sync + 'static>;

struct Mappers<T, U> {
    on_next: NextMapper<T, U>,
    on_error: Option<ErrorMapper<U>>,
    on_complete: Option<CompleteMapper<U>>,
}

impl<T, U> Clone for Mappers<T, U> {
    fn clone(&self) -> Self {
        Self {
            on_next: Arc::clone(&self.on_next),
            on_error: self.on_error.clone(),
            on_complete: self.on_complete.clone(),
        }
    }
}

enum Pending<T, U> {
    /// A source item whose inner stream is built when a slot frees up
    Item(T),
    /// An inner stream built from the source's terminal signal
    Ready(Stream<U>),
}

struct MergeState<T, U> {
    pending: VecDeque<Pending<T, U>>,
    active: usize,
    source_done: bool,
    terminated: bool,
    draining: bool,
}

enum Step<T, U> {
    Start(Pending<T, U>),
    Complete,
    Idle,
}

struct Coordinator<T, U> {
    state: Mutex<MergeState<T, U>>,
    mappers: Mappers<T, U>,
    max_concurrency: usize,
    downstream: Emitter<U>,
}

impl<T: Send + 'static, U: Send + 'static> Coordinator<T, U> {
    fn on_source(self: &Arc<Self>, signal: Signal<T>) {
        match signal {
            Signal::Next(item) => {
                {
                    let mut state = lock(&self.state);
                    if state.terminated {
                        return;
                    }
                    state.pending.push_back(Pending::Item(item));
                }
                self.drain();
            }
            Signal::Error(error) => match &self.mappers.on_error {
                Some(on_error) => match catch_user(|| on_error(error)) {
                    Ok(stream) => self.finish_source(Some(stream)),
                    Err(e) => self.fail(e),
                },
                None => self.fail(error),
            },
            Signal::Complete => match &self.mappers.on_complete {
                Some(on_complete) => match catch_user(|| on_complete()) {
                    Ok(stream) => self.finish_source(Some(stream)),
                    Err(e) => self.fail(e),
                },
                None => self.finish_source(None),
            },
        }
    }

    fn finish_source(self: &Arc<Self>, last: Option<Stream<U>>) {
        {
            let mut state = lock(&self.state);
            if state.terminated {
                return;
            }
            if let Some(stream) = last {
                state.pending.push_back(Pending::Ready(stream));
            }
            state.source_done = true;
        }
        self.drain();
    }

    fn on_inner_complete(self: &Arc<Self>) {
        {
            let mut state = lock(&self.state);
            state.active = state.active.saturating_sub(1);
        }
        self.drain();
    }

    /// Fail fast: the downstream terminal cancels the source and every inner
    fn fail(&self, error: StreamError) {
        {
            let mut state = lock(&self.state);
            if state.terminated {
                return;
            }
            state.terminated = true;
            state.pending.clear();
        }
        self.downstream.error(error);
    }

    fn drain(self: &Arc<Self>) {
        {
            let mut state = lock(&self.state);
            if state.draining {
                return;
            }
            state.draining = true;
        }

        loop {
            let step = {
                let mut state = lock(&self.state);
                let step = if state.terminated {
                    Step::Idle
                } else if state.active < self.max_concurrency && !state.pending.is_empty() {
                    state.active += 1;
                    state.pending.pop_front().map_or(Step::Idle, Step::Start)
                } else if state.source_done && state.active == 0 && state.pending.is_empty() {
                    state.terminated = true;
                    Step::Complete
                } else {
                    Step::Idle
                };
                if !matches!(step, Step::Start(_)) {
                    state.draining = false;
                }
                step
            };

            match step {
                Step::Start(pending) => self.start_inner(pending),
                Step::Complete => {
                    self.downstream.complete();
                    return;
                }
                Step::Idle => return,
            }
        }
    }

    fn start_inner(self: &Arc<Self>, pending: Pending<T, U>) {
        let inner = match pending {
            Pending::Item(item) => match catch_user(|| (self.mappers.on_next)(item)) {
                Ok(stream) => stream,
                Err(error) => {
                    self.fail(error);
                    return;
                }
            },
            Pending::Ready(stream) => stream,
        };

        let coordinator = Arc::clone(self);
        let downstream = self.downstream.clone();
        inner.attach(
            self.downstream.subscription().child(),
            Box::new(move |signal: Signal<U>| match signal {
                Signal::Next(value) => downstream.next(value),
                Signal::Error(error) => coordinator.fail(error),
                Signal::Complete => coordinator.on_inner_complete(),
            }),
        );
    }
}

fn merge_map<T, U>(source: &Stream<T>, mappers: Mappers<T, U>, max_concurrency: Option<usize>) -> Stream<U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    let max_concurrency = max_concurrency.map_or(usize::MAX, |limit| limit.max(1));
    let source = source.clone();
    Stream::create(move |downstream: Emitter<U>| {
        let coordinator = Arc::new(Coordinator {
            state: Mutex::new(MergeState {
                pending: VecDeque::new(),
                active: 0,
                source_done: false,
                terminated: false,
                draining: false,
            }),
            mappers: mappers.clone(),
            max_concurrency,
            downstream: downstream.clone(),
        });
        let upstream = downstream.subscription().child();
        source.attach(upstream, Box::new(move |signal: Signal<T>| coordinator.on_source(signal)));
    })
}

impl<T: Send + 'static> Stream<T> {
    /// Map every item to an inner stream and merge all inners, unbounded.
    ///
    /// Items of different inners may interleave. The result completes once the
    /// source and every inner have completed; the first error from any of them
    /// is forwarded and cancels everything else.
    pub fn flat_map<U, F>(&self, f: F) -> Stream<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Stream<U> + Send + Sync + 'static,
    {
        self.flat_map_with_concurrency(None, f)
    }

    /// `flat_map` with at most `max_concurrency` inner streams subscribed at once.
    ///
    /// Source items arriving while the window is full wait in a queue and are
    /// mapped when an inner completes. `None` is unbounded; `Some(0)` is treated
    /// as `Some(1)`.
    pub fn flat_map_with_concurrency<U, F>(&self, max_concurrency: Option<usize>, f: F) -> Stream<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Stream<U> + Send + Sync + 'static,
    {
        let mappers = Mappers {
            on_next: Arc::new(f) as NextMapper<T, U>,
            on_error: None,
            on_complete: None,
        };
        merge_map(self, mappers, max_concurrency)
    }

    /// `flat_map` with the concurrency limit taken from `config`
    pub fn flat_map_with_config<U, F>(&self, config: &RxConfig, f: F) -> Stream<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Stream<U> + Send + Sync + 'static,
    {
        self.flat_map_with_concurrency(config.flat_map_concurrency, f)
    }

    /// Map every item to an inner stream and run the inners one after another.
    ///
    /// Inner N+1 is subscribed only after inner N completes.
    pub fn concat_map<U, F>(&self, f: F) -> Stream<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Stream<U> + Send + Sync + 'static,
    {
        self.flat_map_with_concurrency(Some(1), f)
    }

    /// Generalized `flat_map`: the source's error and completion are also mapped
    /// to inner streams and merged like the item inners.
    pub fn flat_map_signals<U, FN, FE, FC>(
        &self,
        on_next: FN,
        on_error: FE,
        on_complete: FC,
        max_concurrency: Option<usize>,
    ) -> Stream<U>
    where
        U: Send + 'static,
        FN: Fn(T) -> Stream<U> + Send + Sync + 'static,
        FE: Fn(StreamError) -> Stream<U> + Send + Sync + 'static,
        FC: Fn() -> Stream<U> + Send + Sync + 'static,
    {
        let mappers = Mappers {
            on_next: Arc::new(on_next) as NextMapper<T, U>,
            on_error: Some(Arc::new(on_error) as ErrorMapper<U>),
            on_complete: Some(Arc::new(on_complete) as CompleteMapper<U>),
        };
        merge_map(self, mappers, max_concurrency)
    }
}
