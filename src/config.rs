//! Configuration types for rs2-rx operators and schedulers

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a bounded buffer does when it is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowStrategy {
    /// Drop the oldest buffered item to make room
    DropOldest,
    /// Drop the incoming item
    DropNewest,
    /// Fail the stream with `StreamError::BackpressureOverflow`
    Error,
}

/// Buffering of group items that no consumer has subscribed to yet.
///
/// Items routed to a group before its subscriber arrives are held here. Raising
/// `capacity` without consuming groups promptly grows memory without bound;
/// that trade-off is left to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupBufferConfig {
    pub capacity: usize,
    pub overflow: OverflowStrategy,
}

impl Default for GroupBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            overflow: OverflowStrategy::DropOldest,
        }
    }
}

impl GroupBufferConfig {
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn overflow(mut self, overflow: OverflowStrategy) -> Self {
        self.overflow = overflow;
        self
    }
}

/// Engine wide defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RxConfig {
    /// Default flat_map concurrency; `None` means unbounded
    pub flat_map_concurrency: Option<usize>,
    pub group_buffer: GroupBufferConfig,
    /// Worker count for `TokioScheduler::from_config`
    pub worker_threads: usize,
}

impl Default for RxConfig {
    fn default() -> Self {
        Self {
            flat_map_concurrency: None,
            group_buffer: GroupBufferConfig::default(),
            worker_threads: num_cpus::get(),
        }
    }
}

/// Invalid configuration values
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl RxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flat_map_concurrency(mut self, limit: usize) -> Self {
        self.flat_map_concurrency = Some(limit);
        self
    }

    pub fn group_buffer(mut self, group_buffer: GroupBufferConfig) -> Self {
        self.group_buffer = group_buffer;
        self
    }

    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Parse and validate a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RxConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flat_map_concurrency == Some(0) {
            return Err(ConfigError::Invalid {
                field: "flat_map_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.group_buffer.capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "group_buffer.capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::Invalid {
                field: "worker_threads",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
