//! Dependency probes and the composite health report.
//!
//! Every probe is bounded by a timeout and folded into a descriptive
//! string. A failing dependency never turns into an error for the caller;
//! it just marks the report `degraded`.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use fib_state::{Backends, NotificationChannel, ResultCache, StateResult};
use serde::Serialize;
use tracing::{debug, warn};

/// Default bound on a single dependency probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of a single dependency probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// The round trip succeeded within the timeout.
    Healthy,
    /// The dependency answered with an error.
    Unhealthy(String),
    /// No answer within the timeout.
    TimedOut(Duration),
}

impl ProbeResult {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Report string: `healthy` or `unhealthy: <reason>`.
    pub fn describe(&self) -> String {
        match self {
            Self::Healthy => "healthy".to_string(),
            Self::Unhealthy(reason) => format!("unhealthy: {reason}"),
            Self::TimedOut(after) => format!("unhealthy: timed out after {}ms", after.as_millis()),
        }
    }
}

/// Overall status of a [`HealthReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Composite report: `{"status": ..., "checks": {name: description}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: BTreeMap<String, String>,
}

impl HealthReport {
    /// Fold named probe results; healthy only if every probe is.
    pub fn from_probes<I>(probes: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, ProbeResult)>,
    {
        let mut all_healthy = true;
        let checks = probes
            .into_iter()
            .map(|(name, result)| {
                all_healthy &= result.is_healthy();
                (name.to_string(), result.describe())
            })
            .collect();
        Self {
            status: if all_healthy {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            checks,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Run one bounded-time probe.
pub async fn probe<F>(name: &str, timeout: Duration, ping: F) -> ProbeResult
where
    F: Future<Output = StateResult<()>>,
{
    match tokio::time::timeout(timeout, ping).await {
        Ok(Ok(())) => {
            debug!(dependency = name, "probe healthy");
            ProbeResult::Healthy
        }
        Ok(Err(e)) => {
            warn!(dependency = name, error = %e, "probe failed");
            ProbeResult::Unhealthy(e.to_string())
        }
        Err(_) => {
            warn!(dependency = name, timeout_ms = timeout.as_millis() as u64, "probe timed out");
            ProbeResult::TimedOut(timeout)
        }
    }
}

/// Health of the API process: itself, the index store, and the channel.
///
/// Both dependencies are probed concurrently and independently.
pub async fn check_api(backends: &Backends, timeout: Duration) -> HealthReport {
    let (store, channel) = tokio::join!(
        probe("store", timeout, backends.store.ping()),
        probe("channel", timeout, backends.channel.ping()),
    );
    HealthReport::from_probes([
        ("api", ProbeResult::Healthy),
        ("store", store),
        ("channel", channel),
    ])
}

/// Health of a worker process: itself, the channel, and the result cache.
pub async fn check_worker(
    channel: &dyn NotificationChannel,
    cache: &dyn ResultCache,
    timeout: Duration,
) -> HealthReport {
    let (channel, cache) = tokio::join!(
        probe("channel", timeout, channel.ping()),
        probe("cache", timeout, cache.ping()),
    );
    HealthReport::from_probes([
        ("worker", ProbeResult::Healthy),
        ("channel", channel),
        ("cache", cache),
    ])
}
