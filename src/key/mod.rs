//! Key resolution for rate limiting.
//!
//! This module provides the `Key` trait for resolving one fragment of a
//! bucket's composite key from a request, along with pre-built resolvers for
//! common patterns.
//!
//! # Overview
//!
//! A bucket is addressed by an ordered list of fragments. Each fragment is
//! either a literal string or a resolver run against the current request:
//! - Limit by IP address: all requests from the same IP share a quota
//! - Limit by user ID: all requests from the same user share a quota
//! - Limit by route: different quotas for different endpoints
//!
//! Resolvers may be synchronous ([`FnKey`]) or asynchronous ([`AsyncFnKey`]).
//! They are run one after another in declared order, and the first failure
//! aborts the whole resolution.
//!
//! # Example
//!
//! ```ignore
//! use routelimit::key::{resolve_keys, IpKey, KeyFragment};
//!
//! let fragments = vec![
//!     KeyFragment::resolver(IpKey::new()),
//!     KeyFragment::from("search"),
//! ];
//! let keys = resolve_keys(&fragments, &request).await?;
//! // ["203.0.113.7", "search"]
//! ```

mod composite;
mod extractors;

pub use composite::{EitherKey, OptionalKey};
pub use extractors::*;

use std::future::Future;
use std::sync::Arc;

use crate::error::Result;
use crate::strategy::BoxFuture;

/// Trait for resolving one key fragment from a request.
///
/// # Type Parameters
///
/// - `R`: The request type (e.g., `http::request::Parts`)
pub trait Key<R>: Send + Sync {
    /// Resolve the fragment for this request.
    ///
    /// An error aborts the request check as an internal failure; it is
    /// never turned into a rate limit rejection.
    fn resolve<'a>(&'a self, request: &'a R) -> BoxFuture<'a, Result<String>>;

    /// Get the key name for logging.
    fn name(&self) -> &str;
}

/// A key resolved by a synchronous closure.
#[derive(Clone)]
pub struct FnKey<F> {
    resolver: F,
    name: &'static str,
}

impl<F> std::fmt::Debug for FnKey<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnKey").field("name", &self.name).finish()
    }
}

impl<F> FnKey<F> {
    /// Create a new function-based key.
    pub fn new(name: &'static str, resolver: F) -> Self {
        Self { resolver, name }
    }
}

impl<R, F, S> Key<R> for FnKey<F>
where
    R: Sync,
    F: Fn(&R) -> S + Send + Sync + 'static,
    S: Into<String>,
{
    fn resolve<'a>(&'a self, request: &'a R) -> BoxFuture<'a, Result<String>> {
        let value = (self.resolver)(request).into();
        Box::pin(async move { Ok(value) })
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// A key resolved by an asynchronous, fallible closure.
///
/// The closure receives the request by reference and must return a future
/// that owns whatever it needs from it.
#[derive(Clone)]
pub struct AsyncFnKey<F> {
    resolver: F,
    name: &'static str,
}

impl<F> std::fmt::Debug for AsyncFnKey<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnKey").field("name", &self.name).finish()
    }
}

impl<F> AsyncFnKey<F> {
    /// Create a new async function-based key.
    pub fn new(name: &'static str, resolver: F) -> Self {
        Self { resolver, name }
    }
}

impl<R, F, Fut> Key<R> for AsyncFnKey<F>
where
    R: Sync,
    F: Fn(&R) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    fn resolve<'a>(&'a self, request: &'a R) -> BoxFuture<'a, Result<String>> {
        Box::pin((self.resolver)(request))
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// One element of a composite key.
pub enum KeyFragment<R> {
    /// Passed through unchanged.
    Literal(String),
    /// Resolved against each request.
    Resolver(Arc<dyn Key<R>>),
}

impl<R> KeyFragment<R> {
    /// Wrap a resolver.
    pub fn resolver(key: impl Key<R> + 'static) -> Self {
        Self::Resolver(Arc::new(key))
    }

    /// Get the fragment name for logging.
    pub fn name(&self) -> &str {
        match self {
            Self::Literal(value) => value,
            Self::Resolver(key) => key.name(),
        }
    }

    /// Resolve this fragment for a request.
    pub async fn resolve(&self, request: &R) -> Result<String> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Resolver(key) => key.resolve(request).await,
        }
    }
}

impl<R> Clone for KeyFragment<R> {
    fn clone(&self) -> Self {
        match self {
            Self::Literal(value) => Self::Literal(value.clone()),
            Self::Resolver(key) => Self::Resolver(key.clone()),
        }
    }
}

impl<R> std::fmt::Debug for KeyFragment<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Resolver(key) => f.debug_tuple("Resolver").field(&key.name()).finish(),
        }
    }
}

impl<R> From<&str> for KeyFragment<R> {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_string())
    }
}

impl<R> From<String> for KeyFragment<R> {
    fn from(value: String) -> Self {
        Self::Literal(value)
    }
}

/// Resolve fragments in declared order.
///
/// Resolution is sequential so the composite key is deterministic for a
/// given configuration. The first resolver error is returned as-is.
pub async fn resolve_keys<'f, R, I>(fragments: I, request: &R) -> Result<Vec<String>>
where
    R: 'f,
    I: IntoIterator<Item = &'f KeyFragment<R>>,
{
    let fragments = fragments.into_iter();
    let mut keys = Vec::with_capacity(fragments.size_hint().0);
    for fragment in fragments {
        keys.push(fragment.resolve(request).await?);
    }
    Ok(keys)
}
