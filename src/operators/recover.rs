//! Error recovery operators

use std::sync::Arc;

use crate::emitter::Emitter;
use crate::error::{catch_user, StreamError};
use crate::signal::Signal;
use crate::stream::Stream;

impl<T: Send + 'static> Stream<T> {
    /// Replace an upstream error with one final item, then complete
    pub fn on_error_return<F>(&self, fallback: F) -> Stream<T>
    where
        F: Fn(&StreamError) -> T + Send + Sync + 'static,
    {
        let fallback = Arc::new(fallback);
        self.lift(move |downstream: Emitter<T>| {
            let fallback = Arc::clone(&fallback);
            Box::new(move |signal: Signal<T>| match signal {
                Signal::Error(error) => match catch_user(|| fallback(&error)) {
                    Ok(value) => {
                        log::debug!("replacing error with fallback value: {}", error);
                        downstream.next(value);
                        downstream.complete();
                    }
                    Err(mapper_error) => downstream.error(mapper_error),
                },
                other => downstream.signal(other),
            })
        })
    }

    /// Continue with the stream returned by `fallback` when upstream fails.
    ///
    /// Items emitted before the error are kept. Errors raised by the fallback
    /// stream itself are not recovered again.
    pub fn on_error_resume_next<F>(&self, fallback: F) -> Stream<T>
    where
        F: Fn(StreamError) -> Stream<T> + Send + Sync + 'static,
    {
        let fallback = Arc::new(fallback);
        self.lift(move |downstream: Emitter<T>| {
            let fallback = Arc::clone(&fallback);
            Box::new(move |signal: Signal<T>| match signal {
                Signal::Error(error) => {
                    log::debug!("resuming with fallback stream after error: {}", error);
                    match catch_user(|| fallback(error)) {
                        Ok(stream) => {
                            stream.forward_into(downstream.subscription().child(), downstream.clone())
                        }
                        Err(mapper_error) => downstream.error(mapper_error),
                    }
                }
                other => downstream.signal(other),
            })
        })
    }
}
