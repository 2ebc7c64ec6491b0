//! JSON error responses.

use std::any::Any;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{BoxError, Json};
use serde::Serialize;
use tracing::error;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            retry_after_secs: None,
        }
    }
}

/// Response for a request denied by the admission layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    /// Whole seconds the client should wait before retrying
    pub retry_after_secs: u64,
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: "rate limit exceeded".to_string(),
            retry_after_secs: Some(self.retry_after_secs),
        };

        (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, HeaderValue::from(self.retry_after_secs))],
            Json(body),
        )
            .into_response()
    }
}

/// Fallback for unmatched routes.
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::new("not found")))
}

/// Map errors from the middleware stack, timeouts in particular.
pub async fn middleware_error(err: BoxError) -> Response {
    if err.is::<tower::timeout::error::Elapsed>() {
        return (
            StatusCode::REQUEST_TIMEOUT,
            Json(ErrorResponse::new("request timed out")),
        )
            .into_response();
    }

    error!(error = %err, "Unhandled middleware error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("internal server error")),
    )
        .into_response()
}

/// Response for a request whose handling panicked.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        *s
    } else {
        "unknown panic"
    };
    error!(panic = %detail, "Request handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("internal server error")),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejection_shape() {
        let response = Rejection { retry_after_secs: 4 }.into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "4");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "rate limit exceeded");
        assert_eq!(json["retry_after_secs"], 4);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_json_408() {
        let response = middleware_error(Box::new(tower::timeout::error::Elapsed::new())).await;
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "request timed out");
    }

    #[tokio::test]
    async fn test_other_middleware_error_is_500() {
        let err: BoxError = "boom".into();
        let response = middleware_error(err).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_panic_response_is_500() {
        let response = panic_response(Box::new("handler exploded"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_plain_error_omits_retry() {
        let json = serde_json::to_value(ErrorResponse::new("not found")).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "not found" }));
    }
}
