//! Redis-backed result cache and notification channel.
//!
//! One multiplexed [`ConnectionManager`] is shared by every request; it
//! reconnects on its own after transient failures. Subscriptions open a
//! dedicated pub/sub connection because a subscribed connection cannot
//! issue regular commands.
//!
//! Key layout:
//!
//! ```text
//! values.<index>   → decimal text of fib(index)
//! PUBLISH insert <index>
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use fib_core::config::ChannelConfig;
use fib_core::index::index_from_cache_key;
use fib_core::{CACHE_KEY_PREFIX, COMPUTE_TOPIC, Index};
use futures::StreamExt;
use redis::aio::ConnectionManager;
use tracing::debug;

use crate::backend::{NotificationChannel, ResultCache, Subscription};
use crate::error::{StateError, StateResult, from_cache, from_publish};

/// A Redis client plus its shared multiplexed connection.
#[derive(Clone)]
pub struct RedisConnection {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisConnection {
    /// Open the shared connection and verify it with a `PING`.
    pub async fn connect(config: &ChannelConfig) -> StateResult<Self> {
        let url = config.url();
        let client =
            redis::Client::open(url.as_str()).map_err(|e| StateError::Connect(e.to_string()))?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| StateError::Connect(e.to_string()))?;

        let redis = Self { client, conn };
        redis.ping(StateError::Connect).await?;
        debug!(%url, "redis connected");
        Ok(redis)
    }

    /// View this connection as the result cache.
    pub fn cache(&self) -> RedisCache {
        RedisCache {
            redis: self.clone(),
        }
    }

    /// View this connection as the notification channel.
    pub fn channel(&self) -> RedisChannel {
        RedisChannel {
            redis: self.clone(),
        }
    }

    /// `PING` round trip; failures are reported through `on_error` so each
    /// role names itself.
    async fn ping(&self, on_error: fn(String) -> StateError) -> StateResult<()> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| on_error(e.to_string()))?;
        check_pong(&pong).map_err(on_error)
    }
}

fn check_pong(reply: &str) -> Result<(), String> {
    if reply == "PONG" {
        Ok(())
    } else {
        Err(format!("unexpected PING reply: {reply}"))
    }
}

/// Error constructor for cache health probes.
const CACHE_PING_ERROR: fn(String) -> StateError = StateError::Cache;

/// Error constructor for channel health probes.
const CHANNEL_PING_ERROR: fn(String) -> StateError = StateError::Channel;

/// Result cache over `values.<index>` string keys.
#[derive(Clone)]
pub struct RedisCache {
    redis: RedisConnection,
}

#[async_trait]
impl ResultCache for RedisCache {
    async fn entries(&self) -> StateResult<BTreeMap<String, String>> {
        let mut conn = self.redis.conn.clone();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{CACHE_KEY_PREFIX}*"))
            .query_async(&mut conn)
            .await
            .map_err(from_cache)?;
        if keys.is_empty() {
            return Ok(BTreeMap::new());
        }

        // A key may expire or be deleted between KEYS and MGET.
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(from_cache)?;

        Ok(keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| {
                let index = index_from_cache_key(key)?;
                Some((index.to_string(), value?))
            })
            .collect())
    }

    async fn get(&self, index: Index) -> StateResult<Option<String>> {
        let mut conn = self.redis.conn.clone();
        redis::cmd("GET")
            .arg(index.cache_key())
            .query_async(&mut conn)
            .await
            .map_err(from_cache)
    }

    async fn set(&self, index: Index, value: &str) -> StateResult<()> {
        let mut conn = self.redis.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(index.cache_key())
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(from_cache)?;
        Ok(())
    }

    async fn ping(&self) -> StateResult<()> {
        self.redis.ping(CACHE_PING_ERROR).await
    }
}

/// Pub/sub channel on the fixed compute topic.
#[derive(Clone)]
pub struct RedisChannel {
    redis: RedisConnection,
}

#[async_trait]
impl NotificationChannel for RedisChannel {
    async fn publish(&self, index: Index) -> StateResult<()> {
        let mut conn = self.redis.conn.clone();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(COMPUTE_TOPIC)
            .arg(index.payload())
            .query_async(&mut conn)
            .await
            .map_err(from_publish)?;
        debug!(%index, receivers, "compute notification published");
        Ok(())
    }

    async fn subscribe(&self) -> StateResult<Subscription> {
        let mut pubsub = self
            .redis
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| StateError::Subscribe(e.to_string()))?;
        pubsub
            .subscribe(COMPUTE_TOPIC)
            .await
            .map_err(|e| StateError::Subscribe(e.to_string()))?;
        debug!(topic = COMPUTE_TOPIC, "subscribed");

        let messages = pubsub
            .into_on_message()
            .filter_map(|msg| futures::future::ready(msg.get_payload::<String>().ok()));
        Ok(Box::pin(messages))
    }

    async fn ping(&self) -> StateResult<()> {
        self.redis.ping(CHANNEL_PING_ERROR).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pong_is_the_only_healthy_reply() {
        assert!(check_pong("PONG").is_ok());
        assert_eq!(
            check_pong("LOADING").unwrap_err(),
            "unexpected PING reply: LOADING"
        );
    }

    #[test]
    fn ping_failures_name_their_role() {
        let refused = "connection refused".to_string();
        assert_eq!(
            CHANNEL_PING_ERROR(refused.clone()).to_string(),
            "channel error: connection refused"
        );
        assert_eq!(
            CACHE_PING_ERROR(refused.clone()).to_string(),
            "cache error: connection refused"
        );
        assert_eq!(
            StateError::Connect(refused).to_string(),
            "failed to connect: connection refused"
        );
    }
}
