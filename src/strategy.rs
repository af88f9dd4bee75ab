//! The counting strategy consumed by the gate and the lifecycle controller.
//!
//! [`CountingStrategy`] is the object-safe surface the rest of the crate talks
//! to: a bucket is addressed by a [`Quota`] plus an ordered list of key
//! fragments. [`RateLimiter`] implements it for any [`Algorithm`] running over
//! any [`Storage`].
//!
//! # Example
//!
//! ```ignore
//! use routelimit::{algorithm::FixedWindow, strategy::{CountingStrategy, RateLimiter}, Quota};
//!
//! let limiter = RateLimiter::memory(FixedWindow::new());
//! let quota = Quota::parse("5/minute")?;
//! let keys = vec!["127.0.0.1".to_string(), "get_items".to_string()];
//!
//! if limiter.test(&quota, &keys).await? {
//!     limiter.hit(&quota, &keys).await?;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::algorithm::Algorithm;
use crate::decision::WindowStats;
use crate::error::Result;
use crate::quota::Quota;
use crate::storage::Storage;

#[cfg(feature = "memory")]
use crate::storage::MemoryStorage;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Shared counter store addressed by `(quota, identifiers)`.
///
/// `test` never consumes capacity; `hit` records exactly one occurrence.
/// Implementations must be safe under concurrent calls for both distinct and
/// identical identifier tuples. A `test` followed later by a `hit` is not
/// atomic: two racing requests may both pass `test` before either one hits.
pub trait CountingStrategy: Send + Sync + 'static {
    /// Name of the underlying algorithm.
    fn name(&self) -> &'static str;

    /// Would one more hit fit in the bucket?
    fn test<'a>(
        &'a self,
        quota: &'a Quota,
        identifiers: &'a [String],
    ) -> BoxFuture<'a, Result<bool>>;

    /// Record one hit. Returns whether it fit within the quota.
    fn hit<'a>(
        &'a self,
        quota: &'a Quota,
        identifiers: &'a [String],
    ) -> BoxFuture<'a, Result<bool>>;

    /// Remaining capacity and reset instant of the bucket.
    fn window_stats<'a>(
        &'a self,
        quota: &'a Quota,
        identifiers: &'a [String],
    ) -> BoxFuture<'a, Result<WindowStats>>;

    /// Drop all recorded hits of the bucket.
    fn clear<'a>(
        &'a self,
        quota: &'a Quota,
        identifiers: &'a [String],
    ) -> BoxFuture<'a, Result<()>>;
}

impl<T: CountingStrategy + ?Sized> CountingStrategy for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn test<'a>(

        &'a self,

        quota: &'a Quota,

        identifiers: &'a [String],

    ) -> BoxFuture<'a, Result<bool>> {
        (**self).test(quota, identifiers)
    }

    fn hit<'a>(

        &'a self,

        quota: &'a Quota,

        identifiers: &'a [String],

    ) -> BoxFuture<'a, Result<bool>> {
        (**self).hit(quota, identifiers)
    }

    fn window_stats<'a>(
        &'a self,
        quota: &'a Quota,
        identifiers: &'a [String],
    ) -> BoxFuture<'a, Result<WindowStats>> {
        (**self).window_stats(quota, identifiers)
    }

    fn clear<'a>(

        &'a self,

        quota: &'a Quota,

        identifiers: &'a [String],

    ) -> BoxFuture<'a, Result<()>> {
        (**self).clear(quota, identifiers)
    }
}

/// A [`CountingStrategy`] built from a counting algorithm and a storage backend.
pub struct RateLimiter<A, S> {
    algorithm: A,
    storage: Arc<S>,
}

impl<A, S> std::fmt::Debug for RateLimiter<A, S>
where
    A: std::fmt::Debug,
    S: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("algorithm", &self.algorithm)
            .field("storage", &self.storage)
            .finish()
    }
}

impl<A: Clone, S> Clone for RateLimiter<A, S> {
    fn clone(&self) -> Self {
        Self {
            algorithm: self.algorithm.clone(),
            storage: self.storage.clone(),
        }
    }
}

impl<A: Algorithm, S: Storage> RateLimiter<A, S> {
    /// Create a limiter over the given storage.
    pub fn new(algorithm: A, storage: S) -> Self {
        Self::with_shared_storage(algorithm, Arc::new(storage))
    }

    /// Create a limiter over storage shared with other limiters.
    pub fn with_shared_storage(algorithm: A, storage: Arc<S>) -> Self {
        Self { algorithm, storage }
    }

    /// Get the underlying algorithm.
    pub fn algorithm(&self) -> &A {
        &self.algorithm
    }

    /// Get the underlying storage.
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }
}

#[cfg(feature = "memory")]
impl<A: Algorithm> RateLimiter<A, MemoryStorage> {
    /// Create a limiter over a fresh in-memory store.
    pub fn memory(algorithm: A) -> Self {
        Self::new(algorithm, MemoryStorage::new())
    }
}

impl<A: Algorithm, S: Storage> CountingStrategy for RateLimiter<A, S> {
    fn name(&self) -> &'static str {
        self.algorithm.name()
    }

    fn test<'a>(

        &'a self,

        quota: &'a Quota,

        identifiers: &'a [String],

    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let key = quota.key_for(identifiers);
            self.algorithm.test(&*self.storage, &key, quota).await
        })
    }

    fn hit<'a>(

        &'a self,

        quota: &'a Quota,

        identifiers: &'a [String],

    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let key = quota.key_for(identifiers);
            self.algorithm.hit(&*self.storage, &key, quota).await
        })
    }

    fn window_stats<'a>(
        &'a self,
        quota: &'a Quota,
        identifiers: &'a [String],
    ) -> BoxFuture<'a, Result<WindowStats>> {
        Box::pin(async move {
            let key = quota.key_for(identifiers);
            self.algorithm.window_stats(&*self.storage, &key, quota).await
        })
    }

    fn clear<'a>(

        &'a self,

        quota: &'a Quota,

        identifiers: &'a [String],

    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let key = quota.key_for(identifiers);
            self.algorithm.reset(&*self.storage, &key).await
        })
    }
}
