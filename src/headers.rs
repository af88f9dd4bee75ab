//! Header sets describing a bucket to the client.
//!
//! A rejection always tells the client when to come back (`Retry-After`);
//! the `X-RateLimit-*` family is only added when the limiter exposes it.

use crate::decision::WindowStats;
use crate::quota::Quota;

/// Header names, in the casing they are emitted with.
pub mod names {
    /// Hits allowed per window.
    pub const LIMIT: &str = "X-RateLimit-Limit";
    /// Hits left in the current window.
    pub const REMAINING: &str = "X-RateLimit-Remaining";
    /// Seconds until capacity comes back.
    pub const RESET: &str = "X-RateLimit-Reset";
    /// The limit in effect, as a limit string.
    pub const WINDOW: &str = "X-RateLimit-Window";
    pub const RETRY_AFTER: &str = "Retry-After";
}

/// Headers for one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    retry_after: Option<u64>,
    limit: Option<u64>,
    remaining: Option<u64>,
    reset: Option<u64>,
    window: Option<String>,
}

impl RateLimitHeaders {
    /// Headers of a rejected request.
    ///
    /// `retry_after` is the wait in seconds when the strategy could report
    /// it. With `expose` the bucket is also described: no hits remain and
    /// capacity returns after `retry_after`.
    pub fn rejection(quota: &Quota, retry_after: Option<u64>, expose: bool) -> Self {
        let mut headers = Self {
            retry_after,
            ..Self::default()
        };
        if expose {
            headers.limit = Some(quota.amount());
            headers.remaining = Some(0);
            headers.reset = retry_after;
            headers.window = Some(quota.to_string());
        }
        headers
    }

    /// Headers describing a bucket that still admits requests.
    pub fn window(stats: &WindowStats) -> Self {
        Self {
            limit: Some(stats.limit),
            remaining: Some(stats.remaining),
            reset: Some(stats.reset_seconds()),
            ..Self::default()
        }
    }

    /// Seconds the client is asked to wait, if known.
    pub fn retry_after(&self) -> Option<u64> {
        self.retry_after
    }

    /// `(name, value)` pairs of every header that has a value.
    pub fn to_vec(&self) -> Vec<(&'static str, String)> {
        let numeric = [
            (names::RETRY_AFTER, self.retry_after),
            (names::LIMIT, self.limit),
            (names::REMAINING, self.remaining),
            (names::RESET, self.reset),
        ];

        numeric
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v.to_string())))
            .chain(self.window.clone().map(|w| (names::WINDOW, w)))
            .collect()
    }
}

impl From<&WindowStats> for RateLimitHeaders {
    fn from(stats: &WindowStats) -> Self {
        Self::window(stats)
    }
}
