//! Sliding Window counting algorithm.

use std::time::Duration;

use crate::algorithm::{timestamp_to_instant, window_ms, Algorithm};
use crate::decision::WindowStats;
use crate::error::Result;
use crate::quota::Quota;
use crate::storage::{current_timestamp_ms, Storage, StorageEntry};

/// Sliding Window counting algorithm.
///
/// Uses weighted combination of current and previous windows
/// to eliminate the boundary burst problem.
#[derive(Debug, Clone, Default)]
pub struct SlidingWindow;

/// Counters of the current and previous window as seen at one instant.
#[derive(Debug, Clone, Copy)]
struct Counters {
    current: u64,
    previous: u64,
}

impl SlidingWindow {
    /// Create a new Sliding Window algorithm instance.
    pub fn new() -> Self {
        Self
    }

    /// Calculate the current window start.
    fn window_start(&self, now: u64, window_ms: u64) -> u64 {
        (now / window_ms) * window_ms
    }

    /// Calculate weighted count using current and previous window.
    fn weighted_count(&self, counters: Counters, window_progress: f64) -> f64 {
        counters.current as f64 + (counters.previous as f64 * (1.0 - window_progress))
    }

    /// Project a stored entry onto the window starting at `window_start`.
    fn counters(
        &self,
        entry: Option<&StorageEntry>,
        window_start: u64,
        window_ms: u64,
    ) -> Counters {
        match entry {
            Some(e) if e.window_start == window_start => Counters {
                current: e.count,
                previous: e.prev_count.unwrap_or(0),
            },
            // The stored window just closed and becomes the previous one
            Some(e) if e.window_start == window_start.saturating_sub(window_ms) => Counters {
                current: 0,
                previous: e.count,
            },
            _ => Counters { current: 0, previous: 0 },
        }
    }
}

impl Algorithm for SlidingWindow {
    fn name(&self) -> &'static str {
        "sliding_window"
    }

    async fn test<S: Storage>(&self, storage: &S, key: &str, quota: &Quota) -> Result<bool> {
        let now = current_timestamp_ms();
        let window_ms = window_ms(quota);
        let window_start = self.window_start(now, window_ms);

        let entry = storage.get(key).await?;
        let counters = self.counters(entry.as_ref(), window_start, window_ms);
        let progress = (now - window_start) as f64 / window_ms as f64;

        Ok(self.weighted_count(counters, progress) < quota.amount() as f64)
    }

    async fn hit<S: Storage>(&self, storage: &S, key: &str, quota: &Quota) -> Result<bool> {
        let now = current_timestamp_ms();
        let window_ms = window_ms(quota);
        let window_start = self.window_start(now, window_ms);
        let ttl = Duration::from_millis(window_ms.saturating_mul(2));
        let limit = quota.amount() as f64;

        storage
            .execute_atomic(key, ttl, |entry| {
                let counters = self.counters(entry.as_ref(), window_start, window_ms);
                let progress = (now - window_start) as f64 / window_ms as f64;

                let fits = self.weighted_count(counters, progress) < limit;
                let current = if fits { counters.current + 1 } else { counters.current };
                let entry =
                    StorageEntry::new(current, window_start).with_prev_count(counters.previous);
                (entry, fits)
            })
            .await
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

        let entry = storage.get(key).await?;
        let counters = self.counters(entry.as_ref(), window_start, window_ms);
        let progress = (now - window_start) as f64 / window_ms as f64;
        let weighted = self.weighted_count(counters, progress);

        let remaining = (quota.amount() as f64 - weighted).max(0.0) as u64;
        Ok(WindowStats::new(
            quota.amount(),
            remaining,
            timestamp_to_instant(window_start.saturating_add(window_ms)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_sliding_window_basic() {
        let algorithm = SlidingWindow::new();
        let storage = MemoryStorage::new();
        let quota = Quota::per_hour(5);

        for i in 1..=5 {
            let allowed = algorithm.test(&storage, "user:1", &quota).await.unwrap();
            assert!(allowed, "Request {} should be allowed", i);
            assert!(algorithm.hit(&storage, "user:1", &quota).await.unwrap());
        }

        assert!(!algorithm.test(&storage, "user:1", &quota).await.unwrap());
        assert!(!algorithm.hit(&storage, "user:1", &quota).await.unwrap());
    }

    #[test]
    fn test_previous_window_weight() {
        let algorithm = SlidingWindow::new();
        let previous = StorageEntry::new(10, 0);

        // Halfway through the next window the old hits count for half
        let counters = algorithm.counters(Some(&previous), 1000, 1000);
        assert_eq!(counters.current, 0);
        assert_eq!(counters.previous, 10);
        assert_eq!(algorithm.weighted_count(counters, 0.5), 5.0);

        // Two windows later nothing carries over
        let counters = algorithm.counters(Some(&previous), 2000, 1000);
        assert_eq!(counters.previous, 0);
    }
}
