//! Where counters live.
//!
//! Algorithms only ever read a bucket, bump a windowed counter, rewrite a
//! bucket under its lock, or drop it. A backend that can do those four
//! things atomically per key can serve every bundled algorithm; for a
//! distributed store that atomicity is what keeps concurrent `test`/`hit`
//! calls within the quota.

mod entry;
#[cfg(feature = "memory")]
mod memory;

pub use entry::StorageEntry;

#[cfg(feature = "memory")]
pub use memory::{MemoryStorage, SWEEP_EVERY};

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Backend holding one [`StorageEntry`] per bucket key.
///
/// Writes take a TTL; once it has passed the bucket must read as absent.
pub trait Storage: Send + Sync + 'static {
    /// Read a live bucket.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<StorageEntry>>> + Send;

    /// Drop a bucket. Dropping a missing bucket succeeds.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Add `delta` to the counter of the window starting at `window_start`.
    ///
    /// A missing or expired bucket, or one holding another window, restarts
    /// at `delta`. Returns the count after the increment.
    fn increment(
        &self,
        key: &str,
        delta: u64,
        window_start: u64,
        ttl: Duration,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Replace a bucket with the result of `operation` on its live value.
    ///
    /// No other write to `key` may interleave between the read and the write.
    fn execute_atomic<F, T>(
        &self,
        key: &str,
        ttl: Duration,
        operation: F,
    ) -> impl Future<Output = Result<T>> + Send
    where
        F: FnOnce(Option<StorageEntry>) -> (StorageEntry, T) + Send,
        T: Send;
}

impl<S: Storage + ?Sized> Storage for std::sync::Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<StorageEntry>> {
        (**self).get(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }

    async fn increment(
        &self,
        key: &str,
        delta: u64,
        window_start: u64,
        ttl: Duration,
    ) -> Result<u64> {
        (**self).increment(key, delta, window_start, ttl).await
    }

    async fn execute_atomic<F, T>(&self, key: &str, ttl: Duration, operation: F) -> Result<T>
    where
        F: FnOnce(Option<StorageEntry>) -> (StorageEntry, T) + Send,
        T: Send,
    {
        (**self).execute_atomic(key, ttl, operation).await
    }
}

/// Current wall-clock time in Unix milliseconds.
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
