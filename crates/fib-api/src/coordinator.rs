//! Submission coordinator.
//!
//! `submit` validates an index, records it durably, then publishes a
//! compute notification:
//!
//! ```text
//! validate ──▶ store.insert_if_absent ──▶ channel.publish ──▶ ack
//!     │                 │                        │
//!   400/422            503                      503 (row kept)
//! ```
//!
//! The store write always completes before the publish starts, so any
//! worker reacting to the notification can already observe the row. A
//! failed publish leaves the row in place; [`Coordinator::reconcile`]
//! re-notifies such indices.

use fib_core::{Index, ValidationError};
use fib_state::{Backends, StateError};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

/// Errors returned by coordinator and query operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Dependency(#[from] StateError),
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Acknowledgment that an index was accepted for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubmitAck {
    pub working: bool,
    pub index: i64,
}

/// Accepts submissions. Holds no mutable state of its own.
#[derive(Clone)]
pub struct Coordinator {
    backends: Backends,
}

impl Coordinator {
    pub fn new(backends: Backends) -> Self {
        Self { backends }
    }

    /// Validate `raw`, record it, and request its computation.
    ///
    /// Re-submitting an index is not an error: the store keeps one row and a
    /// fresh notification is published.
    pub async fn submit(&self, raw: i64) -> CoordinatorResult<SubmitAck> {
        let index = Index::new(raw)?;

        self.backends.store.insert_if_absent(index).await?;
        self.backends.channel.publish(index).await?;

        debug!(%index, "submission accepted");
        Ok(SubmitAck {
            working: true,
            index: index.into(),
        })
    }

    /// Re-publish every submitted index that has no cached value yet.
    ///
    /// Returns how many notifications were sent. Stored indices outside the
    /// accepted range are skipped.
    pub async fn reconcile(&self) -> CoordinatorResult<usize> {
        let submitted = self.backends.store.list().await?;
        let computed = self.backends.cache.entries().await?;

        let mut republished = 0;
        for raw in submitted {
            let Ok(index) = Index::new(raw) else {
                continue;
            };
            if computed.contains_key(&index.payload()) {
                continue;
            }
            self.backends.channel.publish(index).await?;
            republished += 1;
        }

        if republished > 0 {
            info!(republished, "re-notified uncomputed indices");
        }
        Ok(republished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fib_state::{IndexStore, MemoryBackends, ResultCache};

    fn setup() -> (MemoryBackends, Coordinator) {
        let memory = MemoryBackends::new();
        let coordinator = Coordinator::new(memory.backends());
        (memory, coordinator)
    }

    #[tokio::test]
    async fn submit_records_then_publishes() {
        let (memory, coordinator) = setup();

        let ack = coordinator.submit(10).await.unwrap();

        assert_eq!(ack, SubmitAck { working: true, index: 10 });
        assert_eq!(memory.store.list().await.unwrap(), vec![10]);
        assert_eq!(memory.channel.published().await, vec!["10".to_string()]);
    }

    #[tokio::test]
    async fn every_valid_index_is_listed_after_submit() {
        let (memory, coordinator) = setup();
        for i in 0..=40 {
            coordinator.submit(i).await.unwrap();
            assert!(memory.store.list().await.unwrap().contains(&i), "index {i}");
        }
    }

    #[tokio::test]
    async fn out_of_range_leaves_store_untouched() {
        let (memory, coordinator) = setup();

        for raw in [-1, -5, 41, 50, i64::MAX, i64::MIN] {
            let err = coordinator.submit(raw).await.unwrap_err();
            assert!(matches!(err, CoordinatorError::Validation(_)), "{raw}");
        }

        assert!(memory.store.list().await.unwrap().is_empty());
        assert!(memory.channel.published().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_submission_keeps_one_row_and_renotifies() {
        let (memory, coordinator) = setup();

        coordinator.submit(12).await.unwrap();
        coordinator.submit(12).await.unwrap();

        assert_eq!(memory.store.list().await.unwrap(), vec![12]);
        assert_eq!(memory.channel.published().await.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_duplicate_submissions_commute() {
        let (memory, coordinator) = setup();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let c = coordinator.clone();
                tokio::spawn(async move { c.submit(21).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(memory.store.list().await.unwrap(), vec![21]);
    }

    #[tokio::test]
    async fn store_failure_skips_publish() {
        let (memory, coordinator) = setup();
        memory.store.set_reachable(false);

        let err = coordinator.submit(3).await.unwrap_err();

        assert!(matches!(err, CoordinatorError::Dependency(StateError::Unavailable("store"))));
        assert!(memory.channel.published().await.is_empty());
    }

    #[tokio::test]
    async fn publish_failure_surfaces_but_keeps_row() {
        let (memory, coordinator) = setup();
        memory.channel.set_reachable(false);

        let err = coordinator.submit(3).await.unwrap_err();

        assert!(matches!(err, CoordinatorError::Dependency(_)));
        assert_eq!(memory.store.list().await.unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn reconcile_renotifies_only_uncomputed() {
        let (memory, coordinator) = setup();
        memory.store.insert_if_absent(Index::new(4).unwrap()).await.unwrap();
        memory.store.insert_if_absent(Index::new(6).unwrap()).await.unwrap();
        memory.cache.set(Index::new(4).unwrap(), "5").await.unwrap();

        let republished = coordinator.reconcile().await.unwrap();

        assert_eq!(republished, 1);
        assert_eq!(memory.channel.published().await, vec!["6".to_string()]);
    }
}
