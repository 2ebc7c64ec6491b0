//! Routes owned by this service and the router assembly.

use std::sync::Arc;

use axum::error_handling::HandleErrorLayer;
use axum::extract::{Request, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info_span, Span};

use super::key::KeyExtractor;
use super::middleware::AdmissionLayer;
use super::rejection::{middleware_error, not_found, panic_response};
use crate::config::ServerConfig;
use crate::ratelimit::Limiter;

/// Shared state for the handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Deployment environment name
    pub env: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub env: String,
    pub version: &'static str,
}

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        env: state.env,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Header carrying the per-request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the router with admission control in front of every route.
pub fn app(server: &ServerConfig, limiter: Arc<dyn Limiter>, extractor: KeyExtractor) -> Router {
    let state = AppState {
        env: server.env.clone(),
    };

    let routes = Router::new()
        .route("/v1/health", get(health))
        .fallback(not_found)
        .with_state(state);

    with_middleware(routes, server, limiter, extractor)
}

/// Wrap `router` in the service's middleware stack.
///
/// Layer order, outermost first: request id assignment and propagation,
/// tracing, panic recovery, request deadline, admission.
fn with_middleware(
    router: Router,
    server: &ServerConfig,
    limiter: Arc<dyn Limiter>,
    extractor: KeyExtractor,
) -> Router {
    router
        .layer(AdmissionLayer::new(limiter, extractor))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(middleware_error))
                .layer(TimeoutLayer::new(server.request_timeout())),
        )
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

fn request_span(request: &Request) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id
    )
}
