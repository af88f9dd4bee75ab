//! Counting algorithm trait and implementations.
//!
//! An algorithm decides how hits against a [`Quota`] are counted in a
//! [`Storage`] backend. Every algorithm splits the decision in two:
//! `test` looks at the bucket without changing it, `hit` records one
//! occurrence. Callers are expected to `test` first and only `hit` once the
//! outcome of the guarded work is known.
//!
//! # Available Algorithms
//!
//! - **Fixed Window** (always): one counter per epoch-aligned window
//! - **Moving Window** (`moving-window` feature): log of hit timestamps over the trailing window
//! - **Sliding Window** (`sliding-window` feature): current counter plus weighted previous window

mod fixed_window;
#[cfg(feature = "moving-window")]
mod moving_window;
#[cfg(feature = "sliding-window")]
mod sliding_window;

pub use fixed_window::FixedWindow;
#[cfg(feature = "moving-window")]
pub use moving_window::MovingWindow;
#[cfg(feature = "sliding-window")]
pub use sliding_window::SlidingWindow;

use std::future::Future;

use crate::decision::WindowStats;
use crate::error::Result;
use crate::quota::Quota;
use crate::storage::{current_timestamp_ms, Storage};

/// Counting algorithm trait.
///
/// All implementations must be thread-safe; atomicity of a single `hit` is
/// delegated to [`Storage::increment`] / [`Storage::execute_atomic`].
///
/// # Algorithm Comparison
///
/// | Algorithm | Accuracy | Memory | Boundary bursts |
/// |-----------|----------|--------|-----------------|
/// | Fixed Window | Low | Low (1 counter) | Up to 2x at window edges |
/// | Moving Window | Highest | High (1 timestamp per hit) | None |
/// | Sliding Window | Medium | Low (2 counters) | Smoothed |
pub trait Algorithm: Send + Sync + 'static {
    /// Get the algorithm name (for logging/metrics).
    fn name(&self) -> &'static str;

    /// Check whether one more hit would fit, without recording anything.
    fn test<S: Storage>(
        &self,
        storage: &S,
        key: &str,
        quota: &Quota,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Record one hit.
    ///
    /// Returns whether the hit fit within the quota.
    fn hit<S: Storage>(
        &self,
        storage: &S,
        key: &str,
        quota: &Quota,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Report the remaining capacity and reset time of a bucket.
    fn window_stats<S: Storage>(
        &self,
        storage: &S,
        key: &str,
        quota: &Quota,
    ) -> impl Future<Output = Result<WindowStats>> + Send;

    /// Reset the bucket stored under `key`.
    fn reset<S: Storage>(&self, storage: &S, key: &str) -> impl Future<Output = Result<()>> + Send {
        async move { storage.delete(key).await }
    }
}

/// Length of a quota window in milliseconds.
pub(crate) fn window_ms(quota: &Quota) -> u64 {
    quota.window_ms()
}

/// Convert a timestamp to an Instant (approximate).
pub(crate) fn timestamp_to_instant(timestamp_ms: u64) -> std::time::Instant {
    let now = std::time::Instant::now();
    let now_ms = current_timestamp_ms();

    if timestamp_ms >= now_ms {
        now.checked_add(std::time::Duration::from_millis(timestamp_ms - now_ms))
            .unwrap_or(now)
    } else {
        now.checked_sub(std::time::Duration::from_millis(now_ms - timestamp_ms))
            .unwrap_or(now)
    }
}
