//! Capability traits for the three external backends.
//!
//! The coordinator, query surface, worker, and health aggregator only see
//! these traits. Production uses PostgreSQL and Redis; tests and the
//! standalone mode use the in-memory implementations.

use std::collections::BTreeMap;
use std::pin::Pin;

use async_trait::async_trait;
use fib_core::Index;
use futures::Stream;

use crate::error::StateResult;

/// Stream of raw notification payloads received from the channel.
pub type Subscription = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Durable, uniqueness-enforcing record of submitted indices.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Insert `index` unless it is already present. Never a conflict error.
    async fn insert_if_absent(&self, index: Index) -> StateResult<()>;

    /// Every stored index, ascending, without duplicates.
    async fn list(&self) -> StateResult<Vec<i64>>;

    /// Lightweight liveness round trip.
    async fn ping(&self) -> StateResult<()>;

    /// Release pooled connections.
    async fn close(&self) {}
}

/// Index → computed value map, written by workers.
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// All cached values keyed by index text (`"7"` → `"21"`).
    async fn entries(&self) -> StateResult<BTreeMap<String, String>>;

    async fn get(&self, index: Index) -> StateResult<Option<String>>;

    async fn set(&self, index: Index, value: &str) -> StateResult<()>;

    async fn ping(&self) -> StateResult<()>;
}

/// Best-effort broadcast of "compute this index" messages.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Publish `index` on the compute topic. Delivery is at-most-once.
    async fn publish(&self, index: Index) -> StateResult<()>;

    /// Receive every payload published on the compute topic from now on.
    async fn subscribe(&self) -> StateResult<Subscription>;

    async fn ping(&self) -> StateResult<()>;
}
