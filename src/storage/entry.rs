//! Bucket state shared by the counting algorithms.

use serde::{Deserialize, Serialize};

/// State of one bucket.
///
/// Holds the fields of every bundled counting algorithm; each algorithm only
/// reads the ones it owns. Serializable so remote backends can store it as a
/// single value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageEntry {
    /// Hits recorded in the window starting at `window_start`.
    pub count: u64,

    /// Window start (Unix milliseconds). For a hit log, the oldest hit.
    pub window_start: u64,

    /// Hits of the window before `window_start` (sliding window).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_count: Option<u64>,

    /// Hit timestamps in ascending order (moving window).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<Vec<u64>>,
}

impl StorageEntry {
    /// A counter of `count` hits in the window starting at `window_start`.
    pub fn new(count: u64, window_start: u64) -> Self {
        Self {
            count,
            window_start,
            ..Self::default()
        }
    }

    /// A log of hit timestamps, oldest first.
    pub fn with_timestamps(timestamps: Vec<u64>) -> Self {
        Self {
            count: timestamps.len() as u64,
            window_start: timestamps.first().copied().unwrap_or(0),
            prev_count: None,
            timestamps: Some(timestamps),
        }
    }

    /// Carry the previous window's count.
    pub fn with_prev_count(mut self, count: u64) -> Self {
        self.prev_count = Some(count);
        self
    }
}
