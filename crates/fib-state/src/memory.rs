//! In-memory backends for tests and the standalone daemon mode.
//!
//! Each backend can be switched to "unreachable", after which every
//! operation fails with [`StateError::Unavailable`], and can be given an
//! artificial ping latency for timeout tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fib_core::Index;
use fib_core::index::index_from_cache_key;
use tokio::sync::{RwLock, broadcast};
use tracing::warn;

use crate::backend::{IndexStore, NotificationChannel, ResultCache, Subscription};
use crate::error::{StateError, StateResult};

/// Reachability switch and ping latency shared by clones of a backend.
#[derive(Debug, Default)]
struct Faults {
    unreachable: AtomicBool,
    ping_delay_ms: AtomicU64,
}

impl Faults {
    fn check(&self, what: &'static str) -> StateResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StateError::Unavailable(what));
        }
        Ok(())
    }

    async fn ping(&self, what: &'static str) -> StateResult<()> {
        let delay = self.ping_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.check(what)
    }

    fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    fn set_ping_delay(&self, delay: Duration) {
        self.ping_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

// ── Index store ────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MemoryIndexStore {
    indices: Arc<RwLock<BTreeSet<i64>>>,
    faults: Arc<Faults>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.faults.set_reachable(reachable);
    }

    pub fn set_ping_delay(&self, delay: Duration) {
        self.faults.set_ping_delay(delay);
    }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn insert_if_absent(&self, index: Index) -> StateResult<()> {
        self.faults.check("store")?;
        self.indices.write().await.insert(index.into());
        Ok(())
    }

    async fn list(&self) -> StateResult<Vec<i64>> {
        self.faults.check("store")?;
        Ok(self.indices.read().await.iter().copied().collect())
    }

    async fn ping(&self) -> StateResult<()> {
        self.faults.ping("store").await
    }
}

// ── Result cache ───────────────────────────────────────────────

/// Keyed by the raw cache key (`values.<index>`), like the Redis keyspace.
#[derive(Clone, Default)]
pub struct MemoryResultCache {
    keys: Arc<RwLock<BTreeMap<String, String>>>,
    faults: Arc<Faults>,
}

impl MemoryResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write an arbitrary key, bypassing the `values.` naming.
    pub async fn insert_raw(&self, key: &str, value: &str) {
        self.keys
            .write()
            .await
            .insert(key.to_string(), value.to_string());
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.faults.set_reachable(reachable);
    }

    pub fn set_ping_delay(&self, delay: Duration) {
        self.faults.set_ping_delay(delay);
    }
}

#[async_trait]
impl ResultCache for MemoryResultCache {
    async fn entries(&self) -> StateResult<BTreeMap<String, String>> {
        self.faults.check("cache")?;
        Ok(self
            .keys
            .read()
            .await
            .iter()
            .filter_map(|(key, value)| {
                index_from_cache_key(key).map(|index| (index.to_string(), value.clone()))
            })
            .collect())
    }

    async fn get(&self, index: Index) -> StateResult<Option<String>> {
        self.faults.check("cache")?;
        Ok(self.keys.read().await.get(&index.cache_key()).cloned())
    }

    async fn set(&self, index: Index, value: &str) -> StateResult<()> {
        self.faults.check("cache")?;
        self.insert_raw(&index.cache_key(), value).await;
        Ok(())
    }

    async fn ping(&self) -> StateResult<()> {
        self.faults.ping("cache").await
    }
}

// ── Notification channel ───────────────────────────────────────

const CHANNEL_CAPACITY: usize = 1024;

/// Most recent publishes kept for inspection; older entries are dropped.
pub const PUBLISHED_LOG_CAPACITY: usize = 256;

/// Broadcast channel; messages published with no subscriber are dropped.
#[derive(Clone)]
pub struct MemoryChannel {
    tx: broadcast::Sender<String>,
    published: Arc<RwLock<VecDeque<String>>>,
    faults: Arc<Faults>,
}

impl Default for MemoryChannel {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            published: Arc::default(),
            faults: Arc::default(),
        }
    }
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent payloads published, oldest first, at most
    /// [`PUBLISHED_LOG_CAPACITY`].
    pub async fn published(&self) -> Vec<String> {
        self.published.read().await.iter().cloned().collect()
    }

    /// Inject a raw payload as if another publisher had sent it.
    pub fn inject(&self, payload: &str) {
        let _ = self.tx.send(payload.to_string());
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.faults.set_reachable(reachable);
    }

    pub fn set_ping_delay(&self, delay: Duration) {
        self.faults.set_ping_delay(delay);
    }
}

#[async_trait]
impl NotificationChannel for MemoryChannel {
    async fn publish(&self, index: Index) -> StateResult<()> {
        self.faults.check("channel")?;
        let payload = index.payload();
        {
            let mut log = self.published.write().await;
            if log.len() == PUBLISHED_LOG_CAPACITY {
                log.pop_front();
            }
            log.push_back(payload.clone());
        }
        // Err only means nobody is subscribed.
        let _ = self.tx.send(payload);
        Ok(())
    }

    async fn subscribe(&self) -> StateResult<Subscription> {
        self.faults.check("channel")?;
        let rx = self.tx.subscribe();
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => return Some((payload, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "subscriber lagged, notifications dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(stream))
    }

    async fn ping(&self) -> StateResult<()> {
        self.faults.ping("channel").await
    }
}
