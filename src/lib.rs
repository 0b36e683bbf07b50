pub mod config;
pub mod constructors;
pub mod emitter;
pub mod error;
pub mod interop;
pub mod operators;
pub mod scheduler;
pub mod signal;
pub mod stream;
pub mod subscription;
pub mod testing;

mod sync;

// Re-export the core types and free constructors at the crate root
pub use config::{ConfigError, GroupBufferConfig, OverflowStrategy, RxConfig};
pub use constructors::*;
pub use emitter::Emitter;
pub use error::{RetryPolicy, StreamError, StreamResult, MAX_BACKOFF_DELAY};
pub use interop::from_async;
pub use operators::{concat, merge, zip_all, GroupedStream, RetrySignal};
pub use scheduler::{
    immediate, single_thread, worker_pool, ImmediateScheduler, Scheduler, SchedulerRef, TokioScheduler,
};
pub use signal::Signal;
pub use stream::Stream;
pub use subscription::Subscription;
pub use testing::TestObserver;
