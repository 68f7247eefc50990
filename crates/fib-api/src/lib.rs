//! fib-api — REST API for the Fibonacci service.
//!
//! Hosts the submission coordinator, the read-only query surface, and the
//! axum handlers that expose them.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Service banner |
//! | POST | `/values` | Submit `{"index": n}` for computation |
//! | GET | `/values/all` | Submitted indices, ascending |
//! | GET | `/values/current` | Computed values, index → value |
//! | GET | `/health` | Store + channel health report |

pub mod coordinator;
pub mod handlers;
pub mod query;
pub mod reconcile;

use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use fib_health::DEFAULT_PROBE_TIMEOUT;
use fib_state::Backends;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use coordinator::{Coordinator, CoordinatorError, SubmitAck};
pub use query::QuerySurface;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Coordinator,
    pub query: QuerySurface,
    pub health_timeout: Duration,
}

impl ApiState {
    pub fn new(backends: Backends) -> Self {
        Self {
            coordinator: Coordinator::new(backends.clone()),
            query: QuerySurface::new(backends),
            health_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }
}

/// Build the API router over the given state.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/values", post(handlers::submit_index))
        .route("/values/all", get(handlers::list_submitted))
        .route("/values/current", get(handlers::list_computed))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
