//! Combinators over key resolvers.

use crate::error::Result;
use crate::key::Key;
use crate::strategy::BoxFuture;

/// Either key - use the primary resolver if it succeeds, otherwise the fallback.
///
/// # Example
///
/// ```ignore
/// use routelimit::key::{EitherKey, HeaderKey, IpKey};
///
/// // Authenticated clients by API key, everyone else by IP
/// let key = EitherKey::new(HeaderKey::api_key(), IpKey::new());
/// ```
#[derive(Debug, Clone)]
pub struct EitherKey<K1, K2> {
    primary: K1,
    fallback: K2,
}

impl<K1, K2> EitherKey<K1, K2> {
    /// Create a new either key.
    pub fn new(primary: K1, fallback: K2) -> Self {
        Self { primary, fallback }
    }
}

impl<R, K1, K2> Key<R> for EitherKey<K1, K2>
where
    R: Sync,
    K1: Key<R>,
    K2: Key<R>,
{
    fn resolve<'a>(&'a self, request: &'a R) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            match self.primary.resolve(request).await {
                Ok(value) => Ok(value),
                Err(err) => {
                    tracing::trace!(
                        key = self.primary.name(),
                        error = %err,
                        "primary key failed, using fallback"
                    );
                    self.fallback.resolve(request).await
                }
            }
        })
    }

    fn name(&self) -> &str {
        "either"
    }
}

/// Optional key wrapper - always succeeds, uses default if resolution fails.
#[derive(Debug, Clone)]
pub struct OptionalKey<K> {
    inner: K,
    default: String,
}

impl<K> OptionalKey<K> {
    /// Create a new optional key with a default value.
    pub fn new(inner: K, default: impl Into<String>) -> Self {
        Self {
            inner,
            default: default.into(),
        }
    }
}

impl<R, K> Key<R> for OptionalKey<K>
where
    R: Sync,
    K: Key<R>,
{
    fn resolve<'a>(&'a self, request: &'a R) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            Ok(self
                .inner
                .resolve(request)
                .await
                .unwrap_or_else(|_| self.default.clone()))
        })
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
