//! Fixed Window counting algorithm.

use std::time::Duration;

use crate::algorithm::{timestamp_to_instant, window_ms, Algorithm};
use crate::decision::WindowStats;
use crate::error::Result;
use crate::quota::Quota;
use crate::storage::{current_timestamp_ms, Storage};

/// Fixed Window counting algorithm.
///
/// Keeps one counter per epoch-aligned window of `quota.window()`. Cheap and
/// predictable, at the cost of letting up to twice the amount through around
/// a window boundary.
#[derive(Debug, Clone, Default)]
pub struct FixedWindow;

impl FixedWindow {
    /// Create a new Fixed Window algorithm instance.
    pub fn new() -> Self {
        Self
    }

    /// Calculate the start of the window containing `now`.
    fn window_start(&self, now: u64, window_ms: u64) -> u64 {
        (now / window_ms) * window_ms
    }

    /// Hits recorded in the current window.
    async fn current_count<S: Storage>(
        &self,
        storage: &S,
        key: &str,
        window_start: u64,
    ) -> Result<u64> {
        Ok(match storage.get(key).await? {
            Some(entry) if entry.window_start == window_start => entry.count,
            _ => 0,
        })
    }
}

impl Algorithm for FixedWindow {
    fn name(&self) -> &'static str {
        "fixed_window"
    }

    async fn test<S: Storage>(&self, storage: &S, key: &str, quota: &Quota) -> Result<bool> {
        let now = current_timestamp_ms();
        let window_start = self.window_start(now, window_ms(quota));

        let count = self.current_count(storage, key, window_start).await?;
        Ok(count < quota.amount())
    }

    async fn hit<S: Storage>(&self, storage: &S, key: &str, quota: &Quota) -> Result<bool> {
        let now = current_timestamp_ms();
        let window_ms = window_ms(quota);
        let window_start = self.window_start(now, window_ms);
        // Expire with the window itself
        let ttl = Duration::from_millis(window_start.saturating_add(window_ms) - now);

        let count = storage.increment(key, 1, window_start, ttl).await?;
        Ok(count <= quota.amount())
    }

    async fn window_stats<S: Storage>(
        &self,
        storage: &S,
        key: &str,
        quota: &Quota,
    ) -> Result<WindowStats> {
        let now = current_timestamp_ms();
        let window_ms = window_ms(quota);
        let window_start = self.window_start(now, window_ms);

        let count = self.current_count(storage, key, window_start).await?;
        Ok(WindowStats::new(
            quota.amount(),
            quota.amount().saturating_sub(count),
            timestamp_to_instant(window_start.saturating_add(window_ms)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_fixed_window_admits_amount() {
        let algorithm = FixedWindow::new();
        let storage = MemoryStorage::new();
        let quota = Quota::per_minute(5);

        for i in 1..=5 {
            let allowed = algorithm.test(&storage, "user:1", &quota).await.unwrap();
            assert!(allowed, "test {} should pass", i);
            assert!(algorithm.hit(&storage, "user:1", &quota).await.unwrap());
        }

        assert!(!algorithm.test(&storage, "user:1", &quota).await.unwrap());
        assert!(!algorithm.hit(&storage, "user:1", &quota).await.unwrap());
    }

    #[tokio::test]
    async fn test_fixed_window_test_does_not_consume() {
        let algorithm = FixedWindow::new();
        let storage = MemoryStorage::new();
        let quota = Quota::per_minute(1);

        for _ in 0..10 {
            assert!(algorithm.test(&storage, "user:1", &quota).await.unwrap());
        }

        let stats = algorithm.window_stats(&storage, "user:1", &quota).await.unwrap();
        assert_eq!(stats.remaining, 1);
    }

    #[tokio::test]
    async fn test_fixed_window_stats() {
        let algorithm = FixedWindow::new();
        let storage = MemoryStorage::new();
        let quota = Quota::per_hour(10);

        algorithm.hit(&storage, "user:1", &quota).await.unwrap();
        algorithm.hit(&storage, "user:1", &quota).await.unwrap();

        let stats = algorithm.window_stats(&storage, "user:1", &quota).await.unwrap();
        assert_eq!(stats.limit, 10);
        assert_eq!(stats.remaining, 8);
        assert!(stats.reset_seconds() <= 3600);
    }

    #[tokio::test]
    async fn test_fixed_window_reset() {
        let algorithm = FixedWindow::new();
        let storage = MemoryStorage::new();
        let quota = Quota::per_minute(1);

        algorithm.hit(&storage, "user:1", &quota).await.unwrap();
        assert!(!algorithm.test(&storage, "user:1", &quota).await.unwrap());

        algorithm.reset(&storage, "user:1").await.unwrap();
        assert!(algorithm.test(&storage, "user:1", &quota).await.unwrap());
    }
}
