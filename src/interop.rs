//! Bridges between push-based [`Stream`]s and pull-based `futures` streams

use async_stream::stream;
use futures::stream::BoxStream;
use futures_util::stream::StreamExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::emitter::Emitter;
use crate::error::StreamResult;
use crate::signal::Signal;
use crate::stream::Stream;
use crate::subscription::Subscription;

/// Cancels the wrapped subscription when the async consumer goes away
struct CancelOnDrop(Subscription);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

impl<T: Send + 'static> Stream<T> {
    /// Consume this stream as a `futures` stream.
    ///
    /// The subscription is made on first poll and cancelled when the returned
    /// stream is dropped. An error is yielded as the last item.
    pub fn into_async(&self) -> BoxStream<'static, StreamResult<T>> {
        let source = self.clone();
        stream! {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let subscription = source.subscribe_signals(move |signal: Signal<T>| {
                let _ = tx.send(signal);
            });
            let _guard = CancelOnDrop(subscription);

            while let Some(signal) = rx.recv().await {
                match signal {
                    Signal::Next(value) => yield Ok(value),
                    Signal::Error(error) => {
                        yield Err(error);
                        break;
                    }
                    Signal::Complete => break,
                }
            }
        }
        .boxed()
    }
}

/// Drive a `futures` stream on `handle`, once per subscription.
///
/// `factory` builds a fresh async stream for every subscriber. The first `Err`
/// item fails the stream; cancelling the subscription aborts the task.
pub fn from_async<T, S, F>(factory: F, handle: Handle) -> Stream<T>
where
    T: Send + 'static,
    S: futures::Stream<Item = StreamResult<T>> + Send + 'static,
    F: Fn() -> S + Send + Sync + 'static,
{
    Stream::create(move |emitter: Emitter<T>| {
        let source = factory();
        let target = emitter.clone();
        let task = handle.spawn(async move {
            let mut source = Box::pin(source);
            while let Some(item) = source.next().await {
                if target.is_cancelled() {
                    return;
                }
                match item {
                    Ok(value) => target.next(value),
                    Err(error) => {
                        target.error(error);
                        return;
                    }
                }
            }
            target.complete();
        });
        emitter.on_cancel(move || task.abort());
    })
}
