//! Moving Window counting algorithm.
//!
//! The Moving Window algorithm stores the timestamp of every hit within the
//! trailing window, providing the highest accuracy but with higher memory usage.

use std::time::Duration;

use crate::algorithm::{timestamp_to_instant, window_ms, Algorithm};
use crate::decision::WindowStats;
use crate::error::Result;
use crate::quota::Quota;
use crate::storage::{current_timestamp_ms, Storage, StorageEntry};

/// Moving Window counting algorithm.
///
/// Stores the timestamp of every hit for highest precision.
/// Best for accuracy-critical applications.
#[derive(Debug, Clone, Default)]
pub struct MovingWindow;

impl MovingWindow {
    /// Create a new Moving Window algorithm instance.
    pub fn new() -> Self {
        Self
    }

    /// Filter timestamps to only include those within the window.
    fn filter_window(&self, timestamps: &[u64], window_start: u64) -> Vec<u64> {
        timestamps
            .iter()
            .filter(|&&ts| ts >= window_start)
            .copied()
            .collect()
    }

    /// Hits still inside the trailing window ending at `now`.
    async fn live_hits<S: Storage>(
        &self,
        storage: &S,
        key: &str,
        now: u64,
        window_ms: u64,
    ) -> Result<Vec<u64>> {
        let timestamps = storage
            .get(key)
            .await?
            .and_then(|e| e.timestamps)
            .unwrap_or_default();

        Ok(self.filter_window(&timestamps, now.saturating_sub(window_ms)))
    }
}

impl Algorithm for MovingWindow {
    fn name(&self) -> &'static str {
        "moving_window"
    }

    async fn test<S: Storage>(&self, storage: &S, key: &str, quota: &Quota) -> Result<bool> {
        let now = current_timestamp_ms();
        let hits = self.live_hits(storage, key, now, window_ms(quota)).await?;
        Ok((hits.len() as u64) < quota.amount())
    }

    async fn hit<S: Storage>(&self, storage: &S, key: &str, quota: &Quota) -> Result<bool> {
        let now = current_timestamp_ms();
        let window_ms = window_ms(quota);
        let window_start = now.saturating_sub(window_ms);
        let limit = quota.amount();

        storage
            .execute_atomic(key, Duration::from_millis(window_ms), |entry| {
                let timestamps = entry.and_then(|e| e.timestamps).unwrap_or_default();
                let mut timestamps = self.filter_window(&timestamps, window_start);

                if (timestamps.len() as u64) < limit {
                    timestamps.push(now);
                    (StorageEntry::with_timestamps(timestamps), true)
                } else {
                    (StorageEntry::with_timestamps(timestamps), false)
                }
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
        let hits = self.live_hits(storage, key, now, window_ms).await?;

        // Capacity comes back when the oldest live hit leaves the window
        let oldest = hits.first().copied().unwrap_or(now);
        Ok(WindowStats::new(
            quota.amount(),
            quota.amount().saturating_sub(hits.len() as u64),
            timestamp_to_instant(oldest.saturating_add(window_ms)),
        ))
    }
}
