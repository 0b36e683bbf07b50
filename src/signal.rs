use crate::error::StreamError;

/// One event delivered to a consumer
///
/// A well-formed sequence is zero or more `Next` followed by exactly one
/// terminal signal (`Error` or `Complete`).
#[derive(Debug, Clone, PartialEq)]
pub enum Signal<T> {
    Next(T),
    Error(StreamError),
    Complete,
}

impl<T> Signal<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Signal::Next(_))
    }

    /// Transform the value of a `Next` signal, passing terminals through
    pub fn map<U, F>(self, f: F) -> Signal<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Signal::Next(value) => Signal::Next(f(value)),
            Signal::Error(error) => Signal::Error(error),
            Signal::Complete => Signal::Complete,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Signal::Next(value) => Some(value),
            Signal::Error(_) | Signal::Complete => None,
        }
    }
}
