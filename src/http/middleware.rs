//! Tower layer that admits or rejects requests before routing.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use tower::{Layer, Service};
use tracing::info;

use super::key::KeyExtractor;
use super::rejection::Rejection;
use crate::ratelimit::Limiter;

/// Admission control layer.
///
/// Every request is keyed, checked against the limiter, and either handed
/// to the inner service unchanged or answered with `429 Too Many Requests`
/// without touching the inner service or the request body.
#[derive(Clone)]
pub struct AdmissionLayer {
    limiter: Arc<dyn Limiter>,
    extractor: KeyExtractor,
}

impl AdmissionLayer {
    /// Create a new admission layer.
    pub fn new(limiter: Arc<dyn Limiter>, extractor: KeyExtractor) -> Self {
        Self { limiter, extractor }
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionService {
            inner,
            limiter: self.limiter.clone(),
            extractor: self.extractor.clone(),
        }
    }
}

/// Service produced by [`AdmissionLayer`].
#[derive(Clone)]
pub struct AdmissionService<S> {
    inner: S,
    limiter: Arc<dyn Limiter>,
    extractor: KeyExtractor,
}

impl<S> Service<Request> for AdmissionService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let key = self.extractor.extract(&request);
        let decision = self.limiter.allow(&key);

        if !decision.permitted {
            let retry_after_secs = decision.retry_after_secs();
            info!(
                key = %key,
                method = %request.method(),
                path = %request.uri().path(),
                retry_after_secs,
                "Request rejected by rate limiter"
            );
            return Box::pin(async move { Ok(Rejection { retry_after_secs }.into_response()) });
        }

        let policy = *self.limiter.policy();

        // Call the instance that was driven to readiness, leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let mut response = inner.call(request).await?;

            if policy.enabled() {
                let headers = response.headers_mut();
                headers.insert("x-ratelimit-limit", HeaderValue::from(policy.max_requests()));
                headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
            }

            Ok(response)
        })
    }
}
