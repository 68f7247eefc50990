//! Periodic reconciliation sweep.
//!
//! Notifications are best-effort, so an index can be stored but never
//! computed. The sweep re-notifies such indices on a fixed interval until
//! shutdown.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::coordinator::Coordinator;

/// Run `coordinator.reconcile()` every `interval` until `shutdown` flips.
pub async fn run_reconciler(
    coordinator: Coordinator,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; give workers a full interval first.
    ticker.tick().await;

    debug!(interval_secs = interval.as_secs(), "reconciler started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = coordinator.reconcile().await {
                    warn!(error = %e, "reconciliation sweep failed");
                }
            }
            _ = shutdown.changed() => {
                debug!("reconciler shutting down");
                break;
            }
        }
    }
}
