//! fib-health — liveness/readiness aggregation for the Fibonacci service.
//!
//! Probes each backend with a bounded-time no-op round trip and folds the
//! results into a [`HealthReport`]:
//!
//! ```text
//! check_api     api + store (PING via SELECT 1) + channel (PING)
//! check_worker  worker + channel + cache
//! ```
//!
//! The report is `healthy` only when every check is; otherwise `degraded`,
//! with the failing dependency's reason in its check entry. Probing never
//! fails the caller.

pub mod checker;

pub use checker::{
    DEFAULT_PROBE_TIMEOUT, HealthReport, HealthStatus, ProbeResult, check_api, check_worker,
};
