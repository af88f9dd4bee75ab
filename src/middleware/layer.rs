//! Tower layers for rate limiting in Axum.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderName, HeaderValue, Response, StatusCode},
};
use http::request::Parts;
use tower::{Layer, Service};

use crate::binding::LimitBinding;
use crate::context::RequestContext;
use crate::error::RateLimitError;
use crate::gate;
use crate::headers::RateLimitHeaders;
use crate::limiter::{Limiter, LimiterOptions};

type BoxResponseFuture<E> = Pin<Box<dyn Future<Output = Result<Response<Body>, E>> + Send>>;

// ============================================================================
// Lifecycle controller
// ============================================================================

/// Tower layer installing a [`Limiter`] on every request.
///
/// Add it with `Router::layer` so it wraps all routes. Bound routes find the
/// request context in the request extensions; after the handler returns,
/// the pending hit is committed unless the response status is excluded.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Limiter<Parts>,
}

impl std::fmt::Debug for RateLimitLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitLayer")
            .field("limiter", &self.limiter)
            .finish()
    }
}

impl RateLimitLayer {
    /// Create a new rate limit layer.
    pub fn new(limiter: Limiter<Parts>) -> Self {
        Self { limiter }
    }

    /// Fixed window counting in memory, keyed by client IP.
    #[cfg(feature = "memory")]
    pub fn memory() -> crate::error::Result<Self> {
        Ok(Self::new(Limiter::builder().ip_default_key().build()?))
    }

    /// The installed limiter.
    pub fn limiter(&self) -> &Limiter<Parts> {
        &self.limiter
    }
}

impl<Inner> Layer<Inner> for RateLimitLayer {
    type Service = RateLimitService<Inner>;

    fn layer(&self, inner: Inner) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// The lifecycle controller service.
#[derive(Clone)]
pub struct RateLimitService<Inner> {
    inner: Inner,
    limiter: Limiter<Parts>,
}

impl<Inner> Service<Request> for RateLimitService<Inner>
where
    Inner: Service<Request, Response = Response<Body>> + Clone + Send + 'static,
    Inner::Future: Send,
{
    type Response = Response<Body>;
    type Error = Inner::Error;
    type Future = BoxResponseFuture<Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        let limiter = self.limiter.clone();
        let context = limiter.context();
        request.extensions_mut().insert(context.clone());

        // Use the instance that was driven to readiness
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let response = inner.call(request).await?;

            match limiter.finish(&context, response.status().as_u16()).await {
                Ok(_) => Ok(response),
                Err(err) => {
                    tracing::error!(error = %err, "failed to record hit");
                    Ok(internal_error_response())
                }
            }
        })
    }
}

// ============================================================================
// Per-route gate
// ============================================================================

/// Tower layer checking one [`LimitBinding`] before the handler runs.
///
/// Usually added through [`limit_route`](super::limit_route) or
/// [`limit_all`](super::limit_all).
#[derive(Clone)]
pub struct LimitLayer {
    binding: Arc<LimitBinding<Parts>>,
}

impl std::fmt::Debug for LimitLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimitLayer")
            .field("binding", &self.binding)
            .finish()
    }
}

impl LimitLayer {
    /// Create a gate for a binding.
    pub fn new(binding: LimitBinding<Parts>) -> Self {
        Self {
            binding: Arc::new(binding),
        }
    }

    /// The checked binding.
    pub fn binding(&self) -> &LimitBinding<Parts> {
        &self.binding
    }
}

impl<Inner> Layer<Inner> for LimitLayer {
    type Service = LimitService<Inner>;

    fn layer(&self, inner: Inner) -> Self::Service {
        LimitService {
            inner,
            binding: self.binding.clone(),
        }
    }
}

/// The per-route gate service.
#[derive(Clone)]
pub struct LimitService<Inner> {
    inner: Inner,
    binding: Arc<LimitBinding<Parts>>,
}

impl<Inner> Service<Request> for LimitService<Inner>
where
    Inner: Service<Request, Response = Response<Body>> + Clone + Send + 'static,
    Inner::Future: Send,
{
    type Response = Response<Body>;
    type Error = Inner::Error;
    type Future = BoxResponseFuture<Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let binding = self.binding.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let context = parts.extensions.get::<RequestContext<Parts>>().cloned();

            let outcome = gate::check(&binding, context.as_ref(), &parts).await;
            match outcome {
                Ok(_) => inner.call(Request::from_parts(parts, body)).await,
                Err(RateLimitError::RateLimitExceeded { quota, retry_after }) => {
                    let options = context
                        .as_ref()
                        .map(|ctx| ctx.options().clone())
                        .unwrap_or_default();
                    let retry_after = retry_after.map(|d| d.as_secs());
                    Ok(rejection_response(&options, &quota, retry_after))
                }
                Err(err) => {
                    tracing::error!(
                        error = %err,
                        quota = %binding.quota(),
                        "rate limit check failed"
                    );
                    Ok(internal_error_response())
                }
            }
        })
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Build the rejection response for an exhausted bucket.
pub(crate) fn rejection_response(
    options: &LimiterOptions,
    quota: &crate::quota::Quota,
    retry_after: Option<u64>,
) -> Response<Body> {
    let message = RateLimitError::RateLimitExceeded {
        quota: quota.clone(),
        retry_after: None,
    }
    .to_string();
    let body = serde_json::json!({ "error": message }).to_string();

    let mut response = Response::new(Body::from(body));
    *response.status_mut() =
        StatusCode::from_u16(options.rejection_status).unwrap_or(StatusCode::TOO_MANY_REQUESTS);

    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let rate_headers = RateLimitHeaders::rejection(quota, retry_after, options.expose_headers);
    for (name, value) in rate_headers.to_vec() {
        let name = HeaderName::from_bytes(name.as_bytes());
        if let (Ok(name), Ok(value)) = (name, HeaderValue::from_str(&value)) {
            headers.insert(name, value);
        }
    }

    response
}

/// Plain 500 for failures that are not rate limit rejections.
fn internal_error_response() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
