//! Stream constructors: of, just, from_iter, range, empty, never, error, defer,
//! interval, timer

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::emitter::Emitter;
use crate::error::{catch_user, StreamError};
use crate::scheduler::SchedulerRef;
use crate::stream::Stream;

// ================================
// Synchronous Constructors
// ================================

/// Emit every item of `items` in order, then complete
pub fn of<T>(items: Vec<T>) -> Stream<T>
where
    T: Clone + Send + Sync + 'static,
{
    from_iter(items)
}

/// Emit a single item, then complete
pub fn just<T>(item: T) -> Stream<T>
where
    T: Clone + Send + Sync + 'static,
{
    Stream::create(move |emitter| {
        emitter.next(item.clone());
        emitter.complete();
    })
}

/// Emit the items of an iterable, re-iterating a fresh clone per subscription
pub fn from_iter<I, T>(iter: I) -> Stream<T>
where
    I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
    T: Send + 'static,
{
    Stream::create(move |emitter| {
        for item in iter.clone() {
            if emitter.is_cancelled() {
                return;
            }
            emitter.next(item);
        }
        emitter.complete();
    })
}

/// Emit `count` consecutive integers starting at `start`
pub fn range(start: i64, count: usize) -> Stream<i64> {
    Stream::create(move |emitter| {
        let mut value = start;
        for _ in 0..count {
            if emitter.is_cancelled() {
                return;
            }
            emitter.next(value);
            value += 1;
        }
        emitter.complete();
    })
}

/// Complete immediately without emitting
pub fn empty<T: Send + 'static>() -> Stream<T> {
    Stream::create(|emitter| emitter.complete())
}

/// Never emit and never terminate
pub fn never<T: Send + 'static>() -> Stream<T> {
    Stream::create(|emitter: Emitter<T>| {
        // The consumer stays reachable until the subscription is cancelled.
        let held = emitter.clone();
        emitter.on_cancel(move || drop(held));
    })
}

/// Fail immediately with `error`
pub fn error<T: Send + 'static>(error: StreamError) -> Stream<T> {
    Stream::create(move |emitter| emitter.error(error.clone()))
}

/// Build the stream lazily, once per subscription
pub fn defer<T, F>(factory: F) -> Stream<T>
where
    T: Send + 'static,
    F: Fn() -> Stream<T> + Send + Sync + 'static,
{
    Stream::create(move |emitter| match catch_user(&factory) {
        Ok(stream) => {
            let upstream = emitter.subscription().child();
            stream.forward_into(upstream, emitter);
        }
        Err(error) => emitter.error(error),
    })
}

// ================================
// Timed Constructors
// ================================

/// Emit 0, 1, 2, ... every `period` on `scheduler`; never completes
pub fn interval(period: Duration, scheduler: SchedulerRef) -> Stream<u64> {
    Stream::create(move |emitter| {
        let counter = Arc::new(AtomicU64::new(0));
        let tick_emitter = emitter.clone();
        let ticks = scheduler.schedule_periodic(
            period,
            Arc::new(move || {
                tick_emitter.next(counter.fetch_add(1, Ordering::Relaxed));
            }),
        );
        emitter.subscription().add(ticks);
    })
}

/// Emit 0 after `delay` on `scheduler`, then complete
pub fn timer(delay: Duration, scheduler: SchedulerRef) -> Stream<u64> {
    Stream::create(move |emitter| {
        let fire = emitter.clone();
        let pending = scheduler.schedule_after(
            delay,
            Box::new(move || {
                fire.next(0);
                fire.complete();
            }),
        );
        emitter.subscription().add(pending);
    })
}
