//! The backend context passed to every operation, and startup connection.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fib_core::ServiceConfig;
use fib_core::retry::{RetryPolicy, retry_with_backoff};
use tracing::{info, warn};

use crate::backend::{IndexStore, NotificationChannel, ResultCache};
use crate::bootstrap::{CredentialBootstrap, PgRoleBootstrap};
use crate::error::StateResult;
use crate::memory::{MemoryChannel, MemoryIndexStore, MemoryResultCache};
use crate::postgres::PgIndexStore;
use crate::redis_backend::RedisConnection;

/// Handles to the store, cache, and channel. Cheap to clone; all shared
/// state lives in the backends themselves.
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn IndexStore>,
    pub cache: Arc<dyn ResultCache>,
    pub channel: Arc<dyn NotificationChannel>,
}

impl Backends {
    pub fn new(
        store: Arc<dyn IndexStore>,
        cache: Arc<dyn ResultCache>,
        channel: Arc<dyn NotificationChannel>,
    ) -> Self {
        Self {
            store,
            cache,
            channel,
        }
    }

    /// Connect to PostgreSQL and Redis with bounded retry.
    ///
    /// Fails with the last attempt's error once retries are exhausted.
    pub async fn connect(config: &ServiceConfig) -> StateResult<Self> {
        let store = connect_store(config).await?;
        let redis = connect_redis(config).await?;
        info!("backends connected");
        Ok(Self::new(
            Arc::new(store),
            Arc::new(redis.cache()),
            Arc::new(redis.channel()),
        ))
    }

    /// Release backend resources.
    pub async fn close(&self) {
        self.store.close().await;
    }
}

/// Concrete in-memory backends, kept so tests can inject faults.
#[derive(Clone, Default)]
pub struct MemoryBackends {
    pub store: MemoryIndexStore,
    pub cache: MemoryResultCache,
    pub channel: MemoryChannel,
}

impl MemoryBackends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backends(&self) -> Backends {
        Backends::new(
            Arc::new(self.store.clone()),
            Arc::new(self.cache.clone()),
            Arc::new(self.channel.clone()),
        )
    }
}

/// Connect the index store, repairing credentials once if enabled.
pub async fn connect_store(config: &ServiceConfig) -> StateResult<PgIndexStore> {
    let bootstrap = PgRoleBootstrap::from_config(&config.store, &config.bootstrap);
    let bootstrap = bootstrap.as_ref().map(|b| b as &dyn CredentialBootstrap);
    connect_with_bootstrap("postgres", config.retry, bootstrap, || {
        PgIndexStore::connect(&config.store)
    })
    .await
}

/// Connect the shared Redis connection (cache + channel).
pub async fn connect_redis(config: &ServiceConfig) -> StateResult<RedisConnection> {
    retry_with_backoff("redis", config.retry, |_| {
        RedisConnection::connect(&config.channel)
    })
    .await
}

/// Retry `connect` with backoff. The first authentication failure runs
/// `bootstrap` (when present) and immediately tries again.
pub async fn connect_with_bootstrap<T, F, Fut>(
    what: &str,
    policy: RetryPolicy,
    bootstrap: Option<&dyn CredentialBootstrap>,
    connect: F,
) -> StateResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = StateResult<T>>,
{
    let repaired = AtomicBool::new(false);
    let connect = &connect;
    let repaired = &repaired;

    retry_with_backoff(what, policy, |_| async move {
        match connect().await {
            Err(e) if e.is_auth_failure() => match bootstrap {
                Some(bootstrap) if !repaired.swap(true, Ordering::SeqCst) => {
                    warn!(dependency = what, error = %e, "credentials rejected, running bootstrap");
                    bootstrap.repair().await?;
                    connect().await
                }
                _ => Err(e),
            },
            other => other,
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::error::StateError;

    #[derive(Default)]
    struct CountingBootstrap {
        calls: AtomicU32,
    }

    #[async_trait]
    impl CredentialBootstrap for CountingBootstrap {
        async fn repair(&self) -> StateResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_triggers_single_repair() {
        let bootstrap = CountingBootstrap::default();
        let attempts = &AtomicU32::new(0);

        let result = connect_with_bootstrap("store", policy(), Some(&bootstrap), move || async move {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StateError::Auth("password authentication failed".into()))
            } else {
                Ok("connected")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "connected");
        assert_eq!(bootstrap.calls.load(Ordering::SeqCst), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn repair_runs_at_most_once() {
        let bootstrap = CountingBootstrap::default();

        let result: StateResult<()> =
            connect_with_bootstrap("store", policy(), Some(&bootstrap), || async {
                Err(StateError::Auth("still rejected".into()))
            })
            .await;

        assert!(result.unwrap_err().is_auth_failure());
        assert_eq!(bootstrap.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_errors_do_not_trigger_repair() {
        let bootstrap = CountingBootstrap::default();

        let result: StateResult<()> =
            connect_with_bootstrap("store", policy(), Some(&bootstrap), || async {
                Err(StateError::Connect("connection refused".into()))
            })
            .await;

        assert!(matches!(result, Err(StateError::Connect(_))));
        assert_eq!(bootstrap.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_without_bootstrap_retries_then_fails() {
        let attempts = &AtomicU32::new(0);
        let result: StateResult<()> = connect_with_bootstrap("store", policy(), None, move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(StateError::Auth("rejected".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn memory_backends_share_state_with_handles() {
        let memory = MemoryBackends::new();
        let backends = memory.backends();

        backends
            .store
            .insert_if_absent(fib_core::Index::new(4).unwrap())
            .await
            .unwrap();
        assert_eq!(memory.store.list().await.unwrap(), vec![4]);
    }
}
