//! Per-route HTTP rate limiting with test-then-hit semantics.
//!
//! `routelimit` meters requests route by route:
//!
//! - **Limit strings**: `"5/minute"`, `"10 per 2 hours"`, parsed once at setup
//! - **Composable keys**: limiter-wide default keys, a per-route identifier and
//!   route keys (literals, sync or async resolvers), or route keys alone
//! - **Filters**: requests are only metered when every filter holds
//! - **Conditional commit**: capacity is checked before the handler and
//!   consumed after it, unless the response status is excluded
//! - **Pluggable counting**: fixed window, moving window, sliding window over
//!   any [`Storage`] backend
//! - **Framework Integration**: Axum middleware
//!
//! # Quick Start
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use routelimit::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> routelimit::Result<()> {
//!     let app = Router::new()
//!         .route(
//!             "/items",
//!             limit_route(get(|| async { "items" }), "get_items", LimitBuilder::new("5/minute"))?,
//!         )
//!         .route(
//!             "/search",
//!             limit_route(
//!                 get(|| async { "results" }),
//!                 "search",
//!                 LimitBuilder::new("1/second").key("shared").no_hit_status_codes([404]),
//!             )?,
//!         )
//!         .layer(RateLimitLayer::memory()?);
//!
//!     // serve `app`...
//!     Ok(())
//! }
//! ```
//!
//! # Request lifecycle
//!
//! 1. [`RateLimitLayer`](middleware::RateLimitLayer) creates a
//!    [`RequestContext`] for the request.
//! 2. The route's gate resolves the composite key, evaluates filters and
//!    calls [`CountingStrategy::test`]. An exhausted bucket is answered with
//!    429 and `{"error": "Rate limit exceeded: 5 per 1 minute"}`.
//! 3. The handler runs.
//! 4. Unless the status is one of the binding's no-hit codes,
//!    [`CountingStrategy::hit`] records the request.
//!
//! # Algorithms
//!
//! | Algorithm | Best For | Memory | Feature Flag |
//! |-----------|----------|--------|--------------|
//! | Fixed Window | Simple use cases | Low | always |
//! | Moving Window | Precision critical | High | `moving-window` |
//! | Sliding Window | General purpose | Low | `sliding-window` |
//!
//! # Feature Flags
//!
//! - `memory` (default): In-memory storage with garbage collection
//! - `axum` (default): Axum middleware integration
//! - `moving-window`, `sliding-window` (default via `all-strategies`)

pub mod algorithm;
pub mod binding;
pub mod context;
pub mod decision;
pub mod error;
pub mod filter;
pub mod gate;
pub mod headers;
pub mod key;
pub mod limiter;
pub mod quota;
pub mod storage;
pub mod strategy;

#[cfg(feature = "axum")]
pub mod middleware;

// Re-export main types
pub use algorithm::{Algorithm, FixedWindow};
pub use binding::{LimitBinding, LimitBuilder, LimitConfig};
pub use context::RequestContext;
pub use decision::{GateOutcome, SkipReason, WindowStats};
pub use error::{ConfigError, RateLimitError, Result, StorageError};
pub use filter::{AsyncFnFilter, Filter, FnFilter};
pub use headers::RateLimitHeaders;
pub use key::{AsyncFnKey, FnKey, Key, KeyFragment};
pub use limiter::{Limiter, LimiterBuilder, LimiterOptions, StrategyKind};
pub use quota::{Granularity, Quota, QuotaBuilder};
pub use storage::{Storage, StorageEntry};
pub use strategy::{CountingStrategy, RateLimiter};

#[cfg(feature = "moving-window")]
pub use algorithm::MovingWindow;

#[cfg(feature = "sliding-window")]
pub use algorithm::SlidingWindow;

// Re-export storage types
#[cfg(feature = "memory")]
pub use storage::MemoryStorage;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::binding::{LimitBuilder, LimitConfig};
    pub use crate::error::{RateLimitError, Result};
    pub use crate::filter::{AsyncFnFilter, FnFilter};
    pub use crate::key::{AsyncFnKey, FnKey, HeaderKey, IpKey, KeyFragment, PathKey};
    pub use crate::limiter::{Limiter, LimiterOptions, StrategyKind};
    pub use crate::quota::Quota;
    pub use crate::strategy::{CountingStrategy, RateLimiter};

    pub use crate::algorithm::FixedWindow;

    #[cfg(feature = "moving-window")]
    pub use crate::algorithm::MovingWindow;

    #[cfg(feature = "sliding-window")]
    pub use crate::algorithm::SlidingWindow;

    #[cfg(feature = "memory")]
    pub use crate::storage::MemoryStorage;

    #[cfg(feature = "axum")]
    pub use crate::middleware::{limit_all, limit_route, RateLimitLayer};
}
