//! REST API handlers.
//!
//! Each handler delegates to the coordinator or the query surface and
//! returns JSON. Failures carry `{"detail": "<reason>"}`.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fib_core::ValidationError;
use tracing::warn;

use crate::ApiState;
use crate::coordinator::CoordinatorError;

/// Error body for every non-2xx response.
#[derive(serde::Serialize)]
struct ErrorBody {
    detail: String,
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ErrorBody {
            detail: msg.to_string(),
        }),
    )
        .into_response()
}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let status = match &self {
            CoordinatorError::Validation(ValidationError::Negative(_)) => StatusCode::BAD_REQUEST,
            CoordinatorError::Validation(ValidationError::TooHigh(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CoordinatorError::Dependency(e) => {
                warn!(error = %e, "request failed on backend");
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        error_response(&self.to_string(), status)
    }
}

/// Submit request body.
///
/// `index` is kept as a JSON number so integers beyond `i64` are still
/// classified by sign and bound instead of failing to deserialize.
#[derive(Debug, serde::Deserialize)]
pub struct SubmitRequest {
    pub index: serde_json::Number,
}

/// Narrow a JSON number to an `i64`, saturating integers outside its range.
///
/// Numbers with a fractional part yield `None`.
fn raw_index(number: &serde_json::Number) -> Option<i64> {
    if let Some(i) = number.as_i64() {
        return Some(i);
    }
    if number.as_u64().is_some() {
        return Some(i64::MAX);
    }
    // Integer literals past u64 arrive as floats; `as` saturates.
    let f = number.as_f64()?;
    (f.is_finite() && f.fract() == 0.0).then_some(f as i64)
}

/// GET /
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Fibonacci Multi-Container API" }))
}

/// POST /values
pub async fn submit_index(
    State(state): State<ApiState>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return error_response(&rejection.body_text(), StatusCode::UNPROCESSABLE_ENTITY);
        }
    };

    let Some(raw) = raw_index(&req.index) else {
        return error_response("Index must be an integer", StatusCode::UNPROCESSABLE_ENTITY);
    };

    match state.coordinator.submit(raw).await {
        Ok(ack) => Json(ack).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /values/all
pub async fn list_submitted(State(state): State<ApiState>) -> Response {
    match state.query.list_submitted().await {
        Ok(indices) => Json(indices).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /values/current
pub async fn list_computed(State(state): State<ApiState>) -> Response {
    match state.query.list_computed().await {
        Ok(values) => Json(values).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /health — always 200; the body says whether anything is degraded.
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.query.check_health(state.health_timeout).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    use fib_state::MemoryBackends;

    fn test_state() -> (MemoryBackends, ApiState) {
        let memory = MemoryBackends::new();
        let state = ApiState::new(memory.backends());
        (memory, state)
    }

    fn request(index: i64) -> Json<SubmitRequest> {
        Json(SubmitRequest {
            index: index.into(),
        })
    }

    fn request_json(body: &str) -> Json<SubmitRequest> {
        Json(serde_json::from_str(body).unwrap())
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn root_banner() {
        let resp = root().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["message"], "Fibonacci Multi-Container API");
    }

    #[tokio::test]
    async fn submit_valid_index() {
        let (memory, state) = test_state();
        let resp = submit_index(State(state), Ok(request(10))).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({ "working": true, "index": 10 })
        );
        assert_eq!(memory.channel.published().await, vec!["10"]);
    }

    #[tokio::test]
    async fn submit_negative_is_bad_request() {
        let (_, state) = test_state();
        let resp = submit_index(State(state), Ok(request(-5))).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["detail"], "Index must be non-negative");
    }

    #[tokio::test]
    async fn submit_too_high_is_unprocessable() {
        let (_, state) = test_state();
        let resp = submit_index(State(state), Ok(request(50))).await;

        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(resp).await["detail"], "Index too high (max 40)");
    }

    #[tokio::test]
    async fn submit_beyond_i64_is_classified_by_sign() {
        let (memory, state) = test_state();

        let resp = submit_index(
            State(state.clone()),
            Ok(request_json(r#"{"index": -99999999999999999999}"#)),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["detail"], "Index must be non-negative");

        let resp = submit_index(
            State(state.clone()),
            Ok(request_json(r#"{"index": 99999999999999999999}"#)),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(resp).await["detail"], "Index too high (max 40)");

        let resp = submit_index(State(state), Ok(request_json(r#"{"index": 18446744073709551615}"#))).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        assert!(memory.channel.published().await.is_empty());
    }

    #[tokio::test]
    async fn submit_fractional_index_is_unprocessable() {
        let (_, state) = test_state();

        let resp = submit_index(State(state.clone()), Ok(request_json(r#"{"index": 7.5}"#))).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(resp).await["detail"], "Index must be an integer");

        let resp = submit_index(State(state), Ok(request_json(r#"{"index": 7.0}"#))).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn submit_with_store_down_is_unavailable() {
        let (memory, state) = test_state();
        memory.store.set_reachable(false);

        let resp = submit_index(State(state), Ok(request(5))).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(resp).await["detail"], "store unavailable");
    }

    #[tokio::test]
    async fn list_submitted_empty() {
        let (_, state) = test_state();
        let resp = list_submitted(State(state)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn list_computed_empty() {
        let (_, state) = test_state();
        let resp = list_computed(State(state)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, serde_json::json!({}));
    }

    #[tokio::test]
    async fn health_is_200_even_when_degraded() {
        let (memory, state) = test_state();
        memory.store.set_reachable(false);

        let resp = health(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["checks"]["store"], "unhealthy: store unavailable");
        assert_eq!(json["checks"]["channel"], "healthy");
    }
}
