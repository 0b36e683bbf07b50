//! Operator implementations, grouped by concern.
//!
//! Every operator is an inherent method on [`Stream`](crate::Stream) except the
//! multi-source constructors re-exported below.

pub mod combine;
pub mod flat_map;
pub mod group_by;
pub mod recover;
pub mod retry;
pub mod schedule;
pub mod timing;
pub mod transform;

pub use combine::{concat, merge, zip_all};
pub use group_by::GroupedStream;
pub use retry::RetrySignal;
