//! fib-core — shared types for the Fibonacci service.
//!
//! Holds everything the API, the worker, and the backends agree on:
//! index validation bounds, the Fibonacci recurrence the worker computes,
//! the wire/key naming used in the channel and cache, configuration
//! loading, and the bounded exponential retry used at startup.

pub mod config;
pub mod index;
pub mod retry;
pub mod sequence;

pub use config::{ConfigError, ServiceConfig};
pub use index::{Index, ValidationError, MAX_INDEX};
pub use retry::RetryPolicy;

/// Pub/sub topic carrying "compute this index" notifications.
pub const COMPUTE_TOPIC: &str = "insert";

/// Prefix of every result cache key (`values.<index>`).
pub const CACHE_KEY_PREFIX: &str = "values.";
