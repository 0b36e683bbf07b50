//! Error types and handling for rs2-rx
//!
//! Every failure travels through a stream as a `Signal::Error` carrying a
//! [`StreamError`]. Cancellation is not an error and has no variant here.

use std::any::Any;
use std::fmt;
use std::time::Duration;

/// Main error type carried by `Signal::Error`
#[derive(Debug, Clone, PartialEq)]
pub enum StreamError {
    /// A user supplied function (mapper, predicate, combiner, key selector)
    /// returned an error or panicked
    UserFunction(String),
    /// Error raised by a producer
    Custom(String),
    /// I/O related errors
    IO(String),
    /// No signal arrived within the timeout window
    Timeout,
    /// A bounded buffer overflowed under the `Error` overflow strategy
    BackpressureOverflow,
    /// Operation not allowed in the current state (e.g. a second subscriber on a group)
    IllegalState(String),
}

impl StreamError {
    /// Shorthand for a producer raised error
    pub fn custom(msg: impl Into<String>) -> Self {
        StreamError::Custom(msg.into())
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic in user function".to_string()
        };
        StreamError::UserFunction(msg)
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::UserFunction(msg) => write!(f, "User function failed: {}", msg),
            StreamError::Custom(msg) => write!(f, "Stream error: {}", msg),
            StreamError::IO(msg) => write!(f, "IO error: {}", msg),
            StreamError::Timeout => write!(f, "Operation timed out"),
            StreamError::BackpressureOverflow => write!(f, "Backpressure buffer overflow"),
            StreamError::IllegalState(msg) => write!(f, "Illegal state: {}", msg),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::IO(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for StreamError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        StreamError::Timeout
    }
}

/// Result type for rs2-rx operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Run a user supplied function, turning a panic into `StreamError::UserFunction`
pub(crate) fn catch_user<R>(f: impl FnOnce() -> R) -> StreamResult<R> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)).map_err(StreamError::from_panic)
}

/// Upper bound of a single exponential backoff delay
pub const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(60);

/// Retry policy for `retry_with_policy`
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    /// No retries
    None,
    /// Immediate retry up to max_retries
    Immediate { max_retries: usize },
    /// Fixed delay between retries
    Fixed { max_retries: usize, delay: Duration },
    /// Exponential backoff, each delay capped at [`MAX_BACKOFF_DELAY`]
    Exponential {
        max_retries: usize,
        initial_delay: Duration,
        multiplier: f64,
    },
}

impl RetryPolicy {
    /// Maximum number of resubscriptions this policy allows
    pub fn max_retries(&self) -> usize {
        match self {
            RetryPolicy::None => 0,
            RetryPolicy::Immediate { max_retries }
            | RetryPolicy::Fixed { max_retries, .. }
            | RetryPolicy::Exponential { max_retries, .. } => *max_retries,
        }
    }

    /// Delay before the given retry (1-based), `None` once retries are exhausted
    pub fn delay_for(&self, attempt: usize) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries() {
            return None;
        }
        match self {
            RetryPolicy::None => None,
            RetryPolicy::Immediate { .. } => Some(Duration::ZERO),
            RetryPolicy::Fixed { delay, .. } => Some(*delay),
            RetryPolicy::Exponential {
                initial_delay,
                multiplier,
                ..
            } => {
                let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
                let seconds = initial_delay.as_secs_f64() * multiplier.powi(exponent);
                let delay = Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(MAX_BACKOFF_DELAY);
                Some(delay.min(MAX_BACKOFF_DELAY))
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Fixed {
            max_retries: 3,
            delay: Duration::from_millis(100),
        }
    }
}
