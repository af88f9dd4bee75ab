//! Parsed rate limit values.
//!
//! A `Quota` is the immutable form of a limit string such as `"5/minute"` or
//! `"100 per 2 hours"`: an amount of hits allowed per `multiples` units of a
//! time granularity.
//!
//! # Examples
//!
//! ```ignore
//! use routelimit::{Granularity, Quota};
//!
//! // 5 hits per minute
//! let quota: Quota = "5/minute".parse()?;
//!
//! // 10 hits per 2 hours
//! let quota: Quota = "10 per 2 hours".parse()?;
//!
//! // Built in code
//! let quota = Quota::per_hour(100).with_multiples(3);
//! assert_eq!(quota.to_string(), "100 per 3 hour");
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, RateLimitError, Result};

/// Namespace prefix of every storage key derived from a quota.
const KEY_NAMESPACE: &str = "LIMITER";

/// Longest accepted window, in seconds.
///
/// Twice the window must still fit a `u64` of milliseconds, since the
/// sliding window keeps the previous window alive alongside the current one.
pub const MAX_WINDOW_SECS: u64 = u64::MAX / 2_000;

/// Time unit of a quota window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One second.
    Second,
    /// Sixty seconds.
    Minute,
    /// Sixty minutes.
    Hour,
    /// Twenty-four hours.
    Day,
    /// Thirty days.
    Month,
    /// Twelve months.
    Year,
}

impl Granularity {
    /// Length of one unit in seconds.
    pub fn seconds(self) -> u64 {
        match self {
            Self::Second => 1,
            Self::Minute => 60,
            Self::Hour => 60 * 60,
            Self::Day => 60 * 60 * 24,
            Self::Month => 60 * 60 * 24 * 30,
            Self::Year => 60 * 60 * 24 * 30 * 12,
        }
    }

    /// Lowercase singular name, as used in limit strings.
    pub fn name(self) -> &'static str {
        match self {
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Granularity {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self> {
        let unit = s.trim().to_ascii_lowercase();
        let singular = unit.strip_suffix('s').unwrap_or(&unit);
        match singular {
            "second" => Ok(Self::Second),
            "minute" => Ok(Self::Minute),
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            _ => Err(ConfigError::InvalidLimit(s.to_string()).into()),
        }
    }
}

/// Rate limit value: `amount` hits per `multiples` x `granularity`.
///
/// Quotas are parsed once while limits are configured and are never mutated
/// afterwards. Two requests share a counter only when both their quota and
/// their resolved key parts are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quota {
    /// Hits allowed per window.
    amount: u64,

    /// Number of granularity units in one window.
    multiples: u64,

    /// Unit of the window.
    granularity: Granularity,
}

impl Quota {
    /// Create a new quota of `amount` hits per one `granularity`.
    ///
    /// # Panics
    ///
    /// Panics if `amount` is 0.
    pub fn new(amount: u64, granularity: Granularity) -> Self {
        assert!(amount > 0, "amount must be greater than 0");

        Self {
            amount,
            multiples: 1,
            granularity,
        }
    }

    /// Create a quota allowing `n` hits per second.
    pub fn per_second(n: u64) -> Self {
        Self::new(n, Granularity::Second)
    }

    /// Create a quota allowing `n` hits per minute.
    pub fn per_minute(n: u64) -> Self {
        Self::new(n, Granularity::Minute)
    }

    /// Create a quota allowing `n` hits per hour.
    pub fn per_hour(n: u64) -> Self {
        Self::new(n, Granularity::Hour)
    }

    /// Create a quota allowing `n` hits per day.
    pub fn per_day(n: u64) -> Self {
        Self::new(n, Granularity::Day)
    }

    /// Try to create a new quota, returning an error if invalid.
    pub fn try_new(amount: u64, multiples: u64, granularity: Granularity) -> Result<Self> {
        if amount == 0 {
            return Err(ConfigError::InvalidQuota("amount must be greater than 0".into()).into());
        }
        if multiples == 0 {
            return Err(ConfigError::InvalidQuota("multiples must be greater than 0".into()).into());
        }
        if window_secs(multiples, granularity).is_none() {
            return Err(ConfigError::InvalidQuota(format!(
                "window must not exceed {MAX_WINDOW_SECS} seconds"
            ))
            .into());
        }
        Ok(Self {
            amount,
            multiples,
            granularity,
        })
    }

    /// Parse a limit string.
    ///
    /// Accepted forms are `"<amount>/<granularity>"` and
    /// `"<amount> per <multiples> <granularity>"`; the multiples may be
    /// omitted in either form, granularities may be plural and matching is
    /// case-insensitive.
    pub fn parse(input: &str) -> Result<Self> {
        let (amount, multiples, granularity) = split_limit(input)
            .ok_or_else(|| ConfigError::InvalidLimit(input.to_string()))?;
        Self::try_new(amount, multiples, granularity)
    }

    /// Stretch the window over `multiples` granularity units.
    ///
    /// # Panics
    ///
    /// Panics if `multiples` is 0 or the window grows past [`MAX_WINDOW_SECS`].
    pub fn with_multiples(mut self, multiples: u64) -> Self {
        assert!(multiples > 0, "multiples must be greater than 0");
        assert!(
            window_secs(multiples, self.granularity).is_some(),
            "window must not exceed {MAX_WINDOW_SECS} seconds"
        );
        self.multiples = multiples;
        self
    }

    /// Get the hits allowed per window.
    pub fn amount(&self) -> u64 {
        self.amount
    }

    /// Get the number of granularity units per window.
    pub fn multiples(&self) -> u64 {
        self.multiples
    }

    /// Get the window unit.
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Get the window duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.granularity.seconds().saturating_mul(self.multiples))
    }

    /// Get the window length in milliseconds, never less than 1.
    pub fn window_ms(&self) -> u64 {
        self.granularity
            .seconds()
            .saturating_mul(self.multiples)
            .saturating_mul(1_000)
            .max(1)
    }

    /// Build the storage key of the bucket addressed by `identifiers`.
    ///
    /// The quota itself is part of the key, so the same identifiers under
    /// different limits never share a counter. A `/` or `\` inside an
    /// identifier is escaped with a backslash, so distinct identifier lists
    /// always give distinct keys.
    pub fn key_for<I, S>(&self, identifiers: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut key = String::from(KEY_NAMESPACE);
        for identifier in identifiers {
            key.push('/');
            for c in identifier.as_ref().chars() {
                if matches!(c, '/' | '\\') {
                    key.push('\\');
                }
                key.push(c);
            }
        }
        key.push_str(&format!(
            "/{}/{}/{}",
            self.amount, self.multiples, self.granularity
        ));
        key
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} per {} {}",
            self.amount, self.multiples, self.granularity
        )
    }
}

impl FromStr for Quota {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Quota {
    type Error = RateLimitError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Quota> for String {
    fn from(quota: Quota) -> Self {
        quota.to_string()
    }
}

/// Window length in seconds, if within [`MAX_WINDOW_SECS`].
fn window_secs(multiples: u64, granularity: Granularity) -> Option<u64> {
    granularity
        .seconds()
        .checked_mul(multiples)
        .filter(|secs| *secs <= MAX_WINDOW_SECS)
}

/// Split a limit string into amount, multiples and granularity.
fn split_limit(input: &str) -> Option<(u64, u64, Granularity)> {
    let lowered = input.trim().to_ascii_lowercase();

    let (amount, rest) = leading_number(&lowered)?;
    let amount = amount?;

    let rest = rest.trim_start();
    let rest = rest
        .strip_prefix('/')
        .or_else(|| rest.strip_prefix("per"))?
        .trim_start();

    let (multiples, unit) = match leading_number(rest) {
        Some((multiples, unit)) => (multiples?, unit),
        None => (1, rest),
    };

    let unit = unit.trim();
    if unit.is_empty() {
        return None;
    }
    let granularity = unit.parse().ok()?;
    Some((amount, multiples, granularity))
}

/// Take the run of ASCII digits at the start of `s`.
///
/// Returns `None` when `s` does not start with a digit, and `Some((None, _))`
/// when the digits overflow a `u64`.
fn leading_number(s: &str) -> Option<(Option<u64>, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    Some((s[..end].parse().ok(), &s[end..]))
}

/// Builder for creating quotas with validation.
#[derive(Debug, Default)]
pub struct QuotaBuilder {
    amount: Option<u64>,
    multiples: Option<u64>,
    granularity: Option<Granularity>,
}

impl QuotaBuilder {
    /// Create a new quota builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hits allowed per window.
    pub fn amount(mut self, n: u64) -> Self {
        self.amount = Some(n);
        self
    }

    /// Set the number of granularity units per window.
    pub fn multiples(mut self, n: u64) -> Self {
        self.multiples = Some(n);
        self
    }

    /// Set the window unit.
    pub fn granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = Some(granularity);
        self
    }

    /// Build the quota, returning an error if invalid.
    pub fn build(self) -> Result<Quota> {
        let amount = self
            .amount
            .ok_or_else(|| ConfigError::MissingRequired("amount".into()))?;
        let granularity = self
            .granularity
            .ok_or_else(|| ConfigError::MissingRequired("granularity".into()))?;

        Quota::try_new(amount, self.multiples.unwrap_or(1), granularity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slash_form() {
        let quota = Quota::parse("5/minute").unwrap();
        assert_eq!(quota.amount(), 5);
        assert_eq!(quota.multiples(), 1);
        assert_eq!(quota.granularity(), Granularity::Minute);
        assert_eq!(quota.window(), Duration::from_secs(60));
    }

    #[test]
    fn test_parse_per_form() {
        let quota = Quota::parse("10 per 2 hours").unwrap();
        assert_eq!(quota.amount(), 10);
        assert_eq!(quota.multiples(), 2);
        assert_eq!(quota.granularity(), Granularity::Hour);
        assert_eq!(quota.window(), Duration::from_secs(7200));
    }

    #[test]
    fn test_parse_is_lenient_on_case_and_spacing() {
        assert_eq!(Quota::parse("  1 / Second ").unwrap(), Quota::per_second(1));
        assert_eq!(Quota::parse("3 PER DAY").unwrap(), Quota::per_day(3));
        assert_eq!(
            Quota::parse("2/3 minutes").unwrap(),
            Quota::per_minute(2).with_multiples(3)
        );
    }

    #[test]
    fn test_parse_rejects_bad_grammar() {
        let inputs = [
            "",
            "minute",
            "5",
            "5/",
            "5/fortnight",
            "five/minute",
            "5 minute",
            "-1/second",
        ];
        for input in inputs {
            let err = Quota::parse(input).unwrap_err();
            assert!(
                matches!(err, RateLimitError::Config(ConfigError::InvalidLimit(_))),
                "{input:?} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn test_parse_rejects_zero() {
        let err = Quota::parse("0/minute").unwrap_err();
        assert!(matches!(err, RateLimitError::Config(ConfigError::InvalidQuota(_))));

        let err = Quota::parse("5 per 0 minute").unwrap_err();
        assert!(matches!(err, RateLimitError::Config(ConfigError::InvalidQuota(_))));
    }

    #[test]
    fn test_parse_rejects_oversized_windows() {
        for input in [
            "1 per 18446744073709552 seconds",
            "1 per 9223372036854776 seconds",
            "1 per 300000000 years",
        ] {
            let err = Quota::parse(input).unwrap_err();
            assert!(
                matches!(err, RateLimitError::Config(ConfigError::InvalidQuota(_))),
                "{input:?} should be rejected, got {err:?}"
            );
        }

        let quota = Quota::parse(&format!("1 per {MAX_WINDOW_SECS} seconds")).unwrap();
        assert_eq!(quota.window_ms(), MAX_WINDOW_SECS * 1_000);
        assert!(quota.window_ms().checked_mul(2).is_some());
    }

    #[test]
    #[should_panic]
    fn test_with_multiples_past_max_window_panics() {
        Quota::per_day(1).with_multiples(u64::MAX / 86_400);
    }

    #[test]
    fn test_display_round_trips() {
        let quota = Quota::per_hour(100).with_multiples(3);
        assert_eq!(quota.to_string(), "100 per 3 hour");
        assert_eq!(Quota::parse(&quota.to_string()).unwrap(), quota);
    }

    #[test]
    fn test_granularity_lengths() {
        assert_eq!(Granularity::Month.seconds(), 30 * 86400);
        assert_eq!(Granularity::Year.seconds(), 12 * Granularity::Month.seconds());
    }

    #[test]
    fn test_key_for() {
        let quota = Quota::per_minute(5);
        assert_eq!(
            quota.key_for(["get_items", "127.0.0.1"]),
            "LIMITER/get_items/127.0.0.1/5/1/minute"
        );
        assert_eq!(quota.key_for(Vec::<String>::new()), "LIMITER/5/1/minute");
    }

    #[test]
    fn test_key_for_escapes_separators() {
        let quota = Quota::per_minute(5);

        assert_eq!(quota.key_for(["a/b"]), r"LIMITER/a\/b/5/1/minute");
        assert_ne!(quota.key_for(["a/b"]), quota.key_for(["a", "b"]));
        assert_ne!(quota.key_for([r"a\", "b"]), quota.key_for([r"a\/b"]));
        assert_ne!(quota.key_for(["GET /items"]), quota.key_for(["GET ", "items"]));
    }

    #[test]
    fn test_serde_uses_limit_strings() {
        let quota: Quota = serde_json::from_str("\"5/minute\"").unwrap();
        assert_eq!(quota, Quota::per_minute(5));
        assert_eq!(serde_json::to_string(&quota).unwrap(), "\"5 per 1 minute\"");
        assert!(serde_json::from_str::<Quota>("\"nope\"").is_err());
    }

    #[test]
    fn test_quota_builder() {
        let quota = QuotaBuilder::new()
            .amount(100)
            .multiples(2)
            .granularity(Granularity::Day)
            .build()
            .unwrap();

        assert_eq!(quota.amount(), 100);
        assert_eq!(quota.window(), Duration::from_secs(2 * 86400));
    }

    #[test]
    fn test_quota_builder_missing_fields() {
        let result = QuotaBuilder::new().amount(100).build();
        assert!(result.is_err());

        let result = QuotaBuilder::new().granularity(Granularity::Second).build();
        assert!(result.is_err());
    }

    #[test]
    #[should_panic]
    fn test_quota_zero_amount_panics() {
        Quota::new(0, Granularity::Minute);
    }
}
