//! Outcome types for rate limiting checks.
//!
//! The pre-handler gate produces a `GateOutcome`; counting strategies report
//! the state of a bucket as `WindowStats`.

use std::time::{Duration, Instant};

/// Why the gate let a request through without metering it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No limiter was installed for this request.
    NoLimiter,
    /// At least one filter evaluated to false.
    FilteredOut,
}

impl SkipReason {
    /// Short name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoLimiter => "no_limiter",
            Self::FilteredOut => "filtered_out",
        }
    }
}

/// Result of a gate check that did not reject the request.
///
/// Rejections are reported as [`RateLimitError::RateLimitExceeded`] so they
/// short-circuit through `?` like any other failure.
///
/// [`RateLimitError::RateLimitExceeded`]: crate::error::RateLimitError::RateLimitExceeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// `test` passed; the hit is pending until the response is known.
    Passed {
        /// Composite key the hit will be recorded against.
        keys: Vec<String>,
    },
    /// The request proceeds unmetered.
    Skipped(SkipReason),
}

impl GateOutcome {
    /// Check if the gate passed (and a hit is pending).
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }

    /// Check if the gate was inert for this request.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    /// Get the composite key, if the gate passed.
    pub fn keys(&self) -> Option<&[String]> {
        match self {
            Self::Passed { keys } => Some(keys),
            Self::Skipped(_) => None,
        }
    }
}

/// Snapshot of a bucket's current window.
#[derive(Debug, Clone)]
pub struct WindowStats {
    /// Maximum hits allowed per window.
    pub limit: u64,
    /// Hits still available in the current window.
    pub remaining: u64,
    /// When the current window resets (or, for moving windows, when the
    /// oldest recorded hit leaves it).
    pub reset_at: Instant,
}

impl WindowStats {
    /// Create a new window snapshot.
    pub fn new(limit: u64, remaining: u64, reset_at: Instant) -> Self {
        Self {
            limit,
            remaining,
            reset_at,
        }
    }

    /// Get the remaining time until reset as a Duration.
    pub fn time_until_reset(&self) -> Duration {
        self.reset_at.saturating_duration_since(Instant::now())
    }

    /// Get the time until reset in whole seconds, rounded up.
    ///
    /// This is the value sent as `Retry-After`, so a client that waits this
    /// long always lands in a fresh window.
    pub fn reset_seconds(&self) -> u64 {
        let wait = self.time_until_reset();
        let secs = wait.as_secs();
        if wait.subsec_nanos() > 0 { secs + 1 } else { secs }
    }

    /// Convert to HTTP headers.
    ///
    /// Returns a vector of (header_name, header_value) pairs.
    pub fn to_headers(&self) -> Vec<(&'static str, String)> {
        crate::headers::RateLimitHeaders::from(self).to_vec()
    }
}
