//! The compute loop: notification in, cache entry out.

use std::sync::Arc;

use fib_core::Index;
use fib_core::retry::{RetryPolicy, retry_with_backoff};
use fib_core::sequence::computed_value;
use fib_state::{Backends, NotificationChannel, ResultCache, StateResult, Subscription};
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// What happened to one notification payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The value was computed and written to the cache.
    Computed { index: Index, value: String },
    /// The payload was not a decimal index in range.
    Rejected(String),
    /// The cache write failed; the index stays uncomputed.
    Failed { index: Index, error: String },
}

/// Consumes compute notifications and fills the result cache.
#[derive(Clone)]
pub struct Worker {
    cache: Arc<dyn ResultCache>,
    channel: Arc<dyn NotificationChannel>,
    resubscribe: RetryPolicy,
}

impl Worker {
    pub fn new(cache: Arc<dyn ResultCache>, channel: Arc<dyn NotificationChannel>) -> Self {
        Self {
            cache,
            channel,
            resubscribe: RetryPolicy::default(),
        }
    }

    /// A worker sharing the cache and channel of `backends`.
    pub fn from_backends(backends: &Backends) -> Self {
        Self::new(backends.cache.clone(), backends.channel.clone())
    }

    /// Backoff used when the subscription must be re-established.
    pub fn with_resubscribe_policy(mut self, policy: RetryPolicy) -> Self {
        self.resubscribe = policy;
        self
    }

    /// Handle one raw payload from the channel.
    pub async fn handle(&self, payload: &str) -> Outcome {
        let index = match Index::from_payload(payload) {
            Some(Ok(index)) => index,
            Some(Err(e)) => {
                warn!(payload, error = %e, "ignoring out-of-range index");
                return Outcome::Rejected(payload.to_string());
            }
            None => {
                warn!(payload, "ignoring malformed notification");
                return Outcome::Rejected(payload.to_string());
            }
        };

        let value = computed_value(index);
        match self.cache.set(index, &value).await {
            Ok(()) => {
                info!(%index, %value, "computed");
                Outcome::Computed { index, value }
            }
            Err(e) => {
                warn!(%index, error = %e, "failed to cache computed value");
                Outcome::Failed {
                    index,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Process notifications until `shutdown` flips.
    ///
    /// When the subscription stream ends, it is re-established with backoff;
    /// exhausting the retries ends the loop with the last error.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> StateResult<()> {
        loop {
            let mut messages = tokio::select! {
                sub = self.subscribe() => sub?,
                _ = shutdown.changed() => return Ok(()),
            };
            info!("worker started, waiting for jobs");

            loop {
                tokio::select! {
                    msg = messages.next() => match msg {
                        Some(payload) => {
                            self.handle(&payload).await;
                        }
                        None => {
                            warn!("notification stream ended, resubscribing");
                            break;
                        }
                    },
                    _ = shutdown.changed() => {
                        debug!("worker shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn subscribe(&self) -> StateResult<Subscription> {
        retry_with_backoff("channel", self.resubscribe, |_| self.channel.subscribe()).await
    }
}
