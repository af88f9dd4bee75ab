//! Filters deciding whether a request is metered at all.
//!
//! A binding only counts a request when every one of its filters holds.
//! Filters may be synchronous ([`FnFilter`]) or asynchronous and fallible
//! ([`AsyncFnFilter`]).

use std::future::Future;
use std::sync::Arc;

use crate::error::Result;
use crate::strategy::BoxFuture;

/// A predicate over the current request.
pub trait Filter<R>: Send + Sync {
    /// Evaluate the predicate.
    fn evaluate<'a>(&'a self, request: &'a R) -> BoxFuture<'a, Result<bool>>;

    /// Get the filter name for logging.
    fn name(&self) -> &str;
}

/// A filter backed by a synchronous closure.
#[derive(Clone)]
pub struct FnFilter<F> {
    predicate: F,
    name: &'static str,
}

impl<F> std::fmt::Debug for FnFilter<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnFilter").field("name", &self.name).finish()
    }
}

impl<F> FnFilter<F> {
    /// Create a new function-based filter.
    pub fn new(name: &'static str, predicate: F) -> Self {
        Self { predicate, name }
    }
}

impl<R, F> Filter<R> for FnFilter<F>
where
    R: Sync,
    F: Fn(&R) -> bool + Send + Sync + 'static,
{
    fn evaluate<'a>(&'a self, request: &'a R) -> BoxFuture<'a, Result<bool>> {
        let holds = (self.predicate)(request);
        Box::pin(std::future::ready(Ok(holds)))
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// A filter backed by an asynchronous, fallible closure.
#[derive(Clone)]
pub struct AsyncFnFilter<F> {
    predicate: F,
    name: &'static str,
}

impl<F> std::fmt::Debug for AsyncFnFilter<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnFilter").field("name", &self.name).finish()
    }
}

impl<F> AsyncFnFilter<F> {
    /// Create a new async function-based filter.
    pub fn new(name: &'static str, predicate: F) -> Self {
        Self { predicate, name }
    }
}

impl<R, F, Fut> Filter<R> for AsyncFnFilter<F>
where
    R: Sync,
    F: Fn(&R) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool>> + Send + 'static,
{
    fn evaluate<'a>(&'a self, request: &'a R) -> BoxFuture<'a, Result<bool>> {
        Box::pin((self.predicate)(request))
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Evaluate every filter, then combine the results.
///
/// All filters run even after one returns false, in declared order. An
/// empty list holds. An error stops evaluation and is returned as-is.
pub async fn all_hold<R>(filters: &[Arc<dyn Filter<R>>], request: &R) -> Result<bool> {
    let mut holds = true;
    for filter in filters {
        let result = filter.evaluate(request).await?;
        if !result {
            tracing::trace!(filter = filter.name(), "filter returned false");
        }
        holds &= result;
    }
    Ok(holds)
}
