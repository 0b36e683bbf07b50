//! The lazy, re-subscribable stream description

use std::fmt;
use std::sync::Arc;

use crate::emitter::{Emitter, Sink};
use crate::error::{catch_user, StreamError};
use crate::signal::Signal;
use crate::subscription::Subscription;

type OnSubscribe<T> = dyn Fn(Emitter<T>) + Send + Sync + 'static;

/// A cold stream: an immutable description of a producer.
///
/// Building a stream does no work. Every call to `subscribe` runs the producer
/// from scratch with its own [`Emitter`] and [`Subscription`]; nothing is shared
/// between two subscriptions of the same stream.
pub struct Stream<T> {
    on_subscribe: Arc<OnSubscribe<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            on_subscribe: Arc::clone(&self.on_subscribe),
        }
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Stream<T> {
    /// Build a stream from a producer function.
    ///
    /// The producer receives an [`Emitter`] and may push signals synchronously or
    /// hand the emitter to another thread. A panic inside the producer body is
    /// delivered as `StreamError::UserFunction`.
    ///
    /// ```
    /// use rs2_rx::Stream;
    ///
    /// let numbers = Stream::create(|emitter| {
    ///     emitter.next(1);
    ///     emitter.next(2);
    ///     emitter.complete();
    /// });
    /// assert_eq!(numbers.blocking_collect().unwrap(), vec![1, 2]);
    /// ```
    pub fn create<F>(producer: F) -> Self
    where
        F: Fn(Emitter<T>) + Send + Sync + 'static,
    {
        Self {
            on_subscribe: Arc::new(producer),
        }
    }

    /// Subscribe with a consumer over the closed [`Signal`] enum
    pub fn subscribe_signals<F>(&self, consumer: F) -> Subscription
    where
        F: FnMut(Signal<T>) + Send + 'static,
    {
        let subscription = Subscription::new();
        log::trace!("subscribe {}", subscription.id());
        self.attach(subscription.clone(), Box::new(consumer));
        subscription
    }

    /// Subscribe with one callback per signal kind
    pub fn subscribe<N, E, C>(&self, mut on_next: N, mut on_error: E, mut on_complete: C) -> Subscription
    where
        N: FnMut(T) + Send + 'static,
        E: FnMut(StreamError) + Send + 'static,
        C: FnMut() + Send + 'static,
    {
        self.subscribe_signals(move |signal| match signal {
            Signal::Next(value) => on_next(value),
            Signal::Error(error) => on_error(error),
            Signal::Complete => on_complete(),
        })
    }

    /// Run the producer for an already created subscription.
    ///
    /// Operators pass a child of their downstream subscription so that a
    /// downstream terminal or cancel tears the upstream down.
    pub(crate) fn attach(&self, subscription: Subscription, sink: Sink<T>) {
        let emitter = Emitter::new(subscription, sink);
        let producer_emitter = emitter.clone();
        if let Err(error) = catch_user(|| (self.on_subscribe)(producer_emitter)) {
            emitter.error(error);
        }
    }

    /// Wrap this stream in an operator whose logic is a per-subscription sink.
    ///
    /// `make_sink` is called once per downstream subscription with the
    /// downstream emitter and returns the consumer for the upstream signals.
    pub(crate) fn lift<U, F>(&self, make_sink: F) -> Stream<U>
    where
        U: Send + 'static,
        F: Fn(Emitter<U>) -> Sink<T> + Send + Sync + 'static,
    {
        let source = self.clone();
        Stream::create(move |downstream: Emitter<U>| {
            let upstream = downstream.subscription().child();
            source.attach(upstream, make_sink(downstream));
        })
    }

    /// Forward every signal of this stream into `downstream`, owned by `subscription`
    pub(crate) fn forward_into(&self, subscription: Subscription, downstream: Emitter<T>) {
        self.attach(subscription, Box::new(move |signal| downstream.signal(signal)));
    }
}
