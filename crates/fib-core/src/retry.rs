//! Bounded exponential retry for establishing backend connections.
//!
//! Dependent infrastructure is frequently not reachable yet when the
//! process boots. `retry_with_backoff` runs an attempt closure up to
//! `max_attempts` times, doubling the sleep between attempts starting at
//! `base_delay`. The last attempt's error is returned to the caller.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

/// Attempt count and backoff base for [`retry_with_backoff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// 1 → base, 2 → 2×base, 3 → 4×base, ...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }
}

/// Run `attempt` until it succeeds or `policy.max_attempts` is exhausted.
///
/// `what` names the dependency in log output.
pub async fn retry_with_backoff<T, E, F, Fut>(
    what: &str,
    policy: RetryPolicy,
    mut attempt: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut n = 1;
    loop {
        match attempt(n).await {
            Ok(value) => {
                if n > 1 {
                    info!(dependency = what, attempt = n, "connected after retry");
                }
                return Ok(value);
            }
            Err(e) if n >= max_attempts => {
                warn!(dependency = what, attempt = n, error = %e, "giving up");
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_after(n);
                warn!(
                    dependency = what,
                    attempt = n,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "connection attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                n += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_secs(1),
        }
    }

    #[test]
    fn delay_doubles_from_base() {
        let p = policy(5);
        assert_eq!(p.delay_after(1), Duration::from_secs(1));
        assert_eq!(p.delay_after(2), Duration::from_secs(2));
        assert_eq!(p.delay_after(3), Duration::from_secs(4));
        assert_eq!(p.delay_after(4), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_first_try_without_sleeping() {
        let start = Instant::now();
        let result: Result<u32, String> =
            retry_with_backoff("test", policy(3), |_| async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let c = calls.clone();
        let result: Result<&str, String> = retry_with_backoff("test", policy(5), move |n| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                if n < 3 { Err(format!("down {n}")) } else { Ok("up") }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "up");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s after attempt 1, 2s after attempt 2.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn final_failure_is_propagated() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), String> = retry_with_backoff("test", policy(3), move |n| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(format!("refused on attempt {n}"))
            }
        })
        .await;

        assert_eq!(result.unwrap_err(), "refused on attempt 3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_tries_once() {
        let result: Result<(), String> =
            retry_with_backoff("test", policy(0), |_| async { Err("no".to_string()) }).await;
        assert!(result.is_err());
    }
}
