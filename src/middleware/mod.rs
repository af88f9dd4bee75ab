//! Axum middleware for rate limiting.
//!
//! Two layers cooperate:
//!
//! - [`RateLimitLayer`] wraps the whole router. It installs a
//!   [`RequestContext`](crate::context::RequestContext) on each request and
//!   commits the pending hit once the response status is known.
//! - [`LimitLayer`] guards a route. It checks the bound limit before the
//!   handler runs and answers with a rejection when the bucket is exhausted.
//!
//! Routes are bound with [`limit_route`] (one handler) or [`limit_all`]
//! (every route registered on a router so far).
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use routelimit::{
//!     binding::LimitBuilder,
//!     middleware::{limit_route, RateLimitLayer},
//! };
//!
//! let app = Router::new()
//!     .route(
//!         "/items",
//!         limit_route(get(get_items), "get_items", LimitBuilder::new("5/minute"))?,
//!     )
//!     .layer(RateLimitLayer::memory()?);
//! ```

mod layer;

pub use layer::{LimitLayer, LimitService, RateLimitLayer, RateLimitService};

use axum::routing::MethodRouter;
use axum::Router;
use http::request::Parts;

use crate::binding::LimitBuilder;
use crate::error::{ConfigError, Result};

/// Bind a limit to a single handler.
///
/// `handler` names the implicit per-route key fragment. Configuration
/// errors are returned here, at setup.
pub fn limit_route<S>(
    route: MethodRouter<S>,
    handler: impl Into<String>,
    limit: LimitBuilder<Parts>,
) -> Result<MethodRouter<S>>
where
    S: Clone + Send + Sync + 'static,
{
    let binding = limit.build(handler)?;
    tracing::debug!(quota = %binding.quota(), "binding limit to route");
    Ok(route.route_layer(LimitLayer::new(binding)))
}

/// Bind one limit to every route currently registered on `router`.
///
/// Routes added afterwards are not covered. Each route keeps its own bucket
/// (keyed by method and matched path) unless default keys are overridden.
/// A router without routes is a configuration error.
pub fn limit_all<S>(router: Router<S>, limit: LimitBuilder<Parts>) -> Result<Router<S>>
where
    S: Clone + Send + Sync + 'static,
{
    if !router.has_routes() {
        return Err(ConfigError::MissingRequired("routes".into()).into());
    }

    let binding = limit.build_routed()?;
    tracing::debug!(quota = %binding.quota(), "binding limit to all routes");
    Ok(router.route_layer(LimitLayer::new(binding)))
}
