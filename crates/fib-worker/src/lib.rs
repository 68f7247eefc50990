//! fib-worker — the compute side of the Fibonacci service.
//!
//! Subscribes to the `insert` topic, computes `fib(index)` for every
//! payload, and writes the decimal result under `values.<index>` in the
//! result cache. A small HTTP surface exposes the worker's own health:
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/health` | worker + channel + cache health report |

pub mod worker;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use fib_health::DEFAULT_PROBE_TIMEOUT;
use fib_state::{NotificationChannel, ResultCache};

pub use worker::{Outcome, Worker};

#[derive(Clone)]
struct HealthState {
    cache: Arc<dyn ResultCache>,
    channel: Arc<dyn NotificationChannel>,
}

/// GET /health
async fn health(State(state): State<HealthState>) -> impl IntoResponse {
    Json(
        fib_health::check_worker(
            state.channel.as_ref(),
            state.cache.as_ref(),
            DEFAULT_PROBE_TIMEOUT,
        )
        .await,
    )
}

/// Router serving the worker health endpoint.
pub fn health_router(cache: Arc<dyn ResultCache>, channel: Arc<dyn NotificationChannel>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(HealthState { cache, channel })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use fib_state::MemoryBackends;

    #[tokio::test]
    async fn health_is_200_when_cache_is_down() {
        let memory = MemoryBackends::new();
        memory.cache.set_reachable(false);
        let backends = memory.backends();
        let state = HealthState {
            cache: backends.cache,
            channel: backends.channel,
        };

        let resp = health(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
