//! Read-only views over the index store and the result cache.
//!
//! Results reflect a recent snapshot of each backend; the two listings are
//! not read atomically with respect to each other.

use std::collections::BTreeMap;
use std::time::Duration;

use fib_health::HealthReport;
use fib_state::Backends;

use crate::coordinator::CoordinatorResult;

#[derive(Clone)]
pub struct QuerySurface {
    backends: Backends,
}

impl QuerySurface {
    pub fn new(backends: Backends) -> Self {
        Self { backends }
    }

    /// Every submitted index, ascending, no duplicates.
    pub async fn list_submitted(&self) -> CoordinatorResult<Vec<i64>> {
        Ok(self.backends.store.list().await?)
    }

    /// Computed values keyed by index text. Indices still being computed
    /// are absent.
    pub async fn list_computed(&self) -> CoordinatorResult<BTreeMap<String, String>> {
        Ok(self.backends.cache.entries().await?)
    }

    /// Probe the store and channel. Never fails.
    pub async fn check_health(&self, timeout: Duration) -> HealthReport {
        fib_health::check_api(&self.backends, timeout).await
    }
}
