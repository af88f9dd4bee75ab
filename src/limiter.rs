//! The request lifecycle controller.
//!
//! A [`Limiter`] owns the counting strategy and the default key fragments
//! shared by every binding. For each request it hands out a fresh
//! [`RequestContext`] with [`Limiter::context`]; once the handler produced a
//! response, [`Limiter::finish`] records the hit the gate left pending,
//! unless the response status is one the binding does not count.
//!
//! # Example
//!
//! ```ignore
//! use routelimit::limiter::{Limiter, LimiterOptions};
//!
//! let limiter = Limiter::<Parts>::builder()
//!     .options(LimiterOptions::from_json(r#"{"strategy": "moving-window"}"#)?)
//!     .default_key_resolver(IpKey::new())
//!     .build()?;
//!
//! let ctx = limiter.context();
//! gate::check(&binding, Some(&ctx), &parts).await?;
//! // ... run the handler ...
//! limiter.finish(&ctx, status).await?;
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::RequestContext;
use crate::error::{ConfigError, Result};
use crate::key::{IpKey, Key, KeyFragment};
use crate::strategy::CountingStrategy;

#[cfg(feature = "memory")]
use crate::algorithm::FixedWindow;
#[cfg(all(feature = "memory", feature = "moving-window"))]
use crate::algorithm::MovingWindow;
#[cfg(all(feature = "memory", feature = "sliding-window"))]
use crate::algorithm::SlidingWindow;
#[cfg(feature = "memory")]
use crate::strategy::RateLimiter;

/// Counting algorithm selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// One counter per fixed window.
    #[default]
    FixedWindow,
    /// Log of hit timestamps over the trailing window.
    MovingWindow,
    /// Weighted current and previous window counters.
    SlidingWindow,
}

impl StrategyKind {
    /// Build this strategy over a fresh in-memory store.
    #[cfg(feature = "memory")]
    pub fn memory(self) -> Result<Arc<dyn CountingStrategy>> {
        match self {
            Self::FixedWindow => Ok(Arc::new(RateLimiter::memory(FixedWindow::new()))),
            #[cfg(feature = "moving-window")]
            Self::MovingWindow => Ok(Arc::new(RateLimiter::memory(MovingWindow::new()))),
            #[cfg(feature = "sliding-window")]
            Self::SlidingWindow => Ok(Arc::new(RateLimiter::memory(SlidingWindow::new()))),
            #[allow(unreachable_patterns)]
            other => {
                let reason = format!("{other:?} is not enabled in this build");
                Err(ConfigError::InvalidOptions(reason).into())
            }
        }
    }
}

/// Limiter-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterOptions {
    /// Algorithm used when no strategy is given to the builder.
    pub strategy: StrategyKind,
    /// Status of rejection responses.
    pub rejection_status: u16,
    /// Send `X-RateLimit-*` headers with rejections.
    pub expose_headers: bool,
}

impl Default for LimiterOptions {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            rejection_status: 429,
            expose_headers: true,
        }
    }
}

impl LimiterOptions {
    /// Load options from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| ConfigError::InvalidOptions(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Set the rejection status.
    pub fn with_rejection_status(mut self, status: u16) -> Self {
        self.rejection_status = status;
        self
    }

    /// Set whether rejections carry `X-RateLimit-*` headers.
    pub fn with_expose_headers(mut self, expose: bool) -> Self {
        self.expose_headers = expose;
        self
    }

    /// Check the options are usable.
    pub fn validate(&self) -> Result<()> {
        if !(400..=599).contains(&self.rejection_status) {
            return Err(ConfigError::InvalidOptions(format!(
                "rejection_status must be an error status, got {}",
                self.rejection_status
            ))
            .into());
        }
        Ok(())
    }
}

/// Installs limiter state on requests and commits pending hits.
pub struct Limiter<R> {
    strategy: Arc<dyn CountingStrategy>,
    default_keys: Arc<[KeyFragment<R>]>,
    options: Arc<LimiterOptions>,
}

impl<R> Clone for Limiter<R> {
    fn clone(&self) -> Self {
        Self {
            strategy: self.strategy.clone(),
            default_keys: self.default_keys.clone(),
            options: self.options.clone(),
        }
    }
}

impl<R> std::fmt::Debug for Limiter<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Limiter")
            .field("strategy", &self.strategy.name())
            .field("default_keys", &self.default_keys)
            .field("options", &self.options)
            .finish()
    }
}

impl<R> Limiter<R> {
    /// Create a limiter with no default keys and default options.
    pub fn new(strategy: impl CountingStrategy) -> Self {
        Self {
            strategy: Arc::new(strategy),
            default_keys: Arc::from(Vec::new()),
            options: Arc::new(LimiterOptions::default()),
        }
    }

    /// Create a limiter builder.
    pub fn builder() -> LimiterBuilder<R> {
        LimiterBuilder::new()
    }

    /// The counting strategy.
    pub fn strategy(&self) -> &Arc<dyn CountingStrategy> {
        &self.strategy
    }

    /// Default key fragments.
    pub fn default_keys(&self) -> &[KeyFragment<R>] {
        &self.default_keys
    }

    /// Limiter options.
    pub fn options(&self) -> &LimiterOptions {
        &self.options
    }

    /// Create the state for a new request.
    pub fn context(&self) -> RequestContext<R> {
        RequestContext::new(
            self.strategy.clone(),
            self.default_keys.clone(),
            self.options.clone(),
        )
    }

    /// Commit the request once its response status is known.
    ///
    /// Returns whether a hit was recorded. Nothing is counted when no gate
    /// passed for the request or when the binding excludes `status`.
    pub async fn finish(&self, context: &RequestContext<R>, status: u16) -> Result<bool> {
        let Some(triggered) = context.take_triggered() else {
            return Ok(false);
        };

        if !triggered.binding.counts_status(status) {
            tracing::debug!(status, keys = ?triggered.keys, "status not counted, skipping hit");
            return Ok(false);
        }

        let quota = triggered.binding.quota();
        let fits = context.strategy().hit(quota, &triggered.keys).await?;
        if fits {
            tracing::trace!(quota = %quota, keys = ?triggered.keys, "hit recorded");
        } else {
            // A concurrent request used the capacity between test and hit
            tracing::warn!(quota = %quota, keys = ?triggered.keys, "hit exceeded quota");
        }
        Ok(true)
    }
}

/// Builder for [`Limiter`].
pub struct LimiterBuilder<R> {
    strategy: Option<Arc<dyn CountingStrategy>>,
    default_keys: Vec<KeyFragment<R>>,
    options: LimiterOptions,
}

impl<R> Default for LimiterBuilder<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> LimiterBuilder<R> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            strategy: None,
            default_keys: Vec::new(),
            options: LimiterOptions::default(),
        }
    }

    /// Use this counting strategy.
    pub fn strategy(mut self, strategy: impl CountingStrategy) -> Self {
        self.strategy = Some(Arc::new(strategy));
        self
    }

    /// Use a counting strategy shared with other limiters.
    pub fn shared_strategy(mut self, strategy: Arc<dyn CountingStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Append a default key fragment.
    pub fn default_key(mut self, fragment: impl Into<KeyFragment<R>>) -> Self {
        self.default_keys.push(fragment.into());
        self
    }

    /// Append a default key resolved from the request.
    pub fn default_key_resolver(mut self, key: impl Key<R> + 'static) -> Self {
        self.default_keys.push(KeyFragment::resolver(key));
        self
    }

    /// Key every binding by client IP first.
    pub fn ip_default_key(self) -> Self
    where
        IpKey: Key<R>,
    {
        self.default_key_resolver(IpKey::new())
    }

    /// Set limiter options.
    pub fn options(mut self, options: LimiterOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the limiter.
    ///
    /// Without an explicit strategy, the one named in the options is built
    /// over in-memory storage.
    pub fn build(self) -> Result<Limiter<R>> {
        self.options.validate()?;

        let strategy = match self.strategy {
            Some(strategy) => strategy,
            #[cfg(feature = "memory")]
            None => self.options.strategy.memory()?,
            #[cfg(not(feature = "memory"))]
            None => return Err(ConfigError::MissingRequired("strategy".into()).into()),
        };

        Ok(Limiter {
            strategy,
            default_keys: Arc::from(self.default_keys),
            options: Arc::new(self.options),
        })
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::binding::LimitBuilder;
    use crate::error::RateLimitError;
    use crate::gate;

    #[test]
    fn test_options_from_json() {
        let options = LimiterOptions::from_json(r#"{"rejection_status": 503}"#).unwrap();
        assert_eq!(options.rejection_status, 503);
        assert_eq!(options.strategy, StrategyKind::FixedWindow);
        assert!(options.expose_headers);

        let options =
            LimiterOptions::from_json(r#"{"strategy": "sliding-window", "expose_headers": false}"#)
                .unwrap();
        assert_eq!(options.strategy, StrategyKind::SlidingWindow);
        assert!(!options.expose_headers);
    }

    #[test]
    fn test_invalid_options() {
        let err = LimiterOptions::from_json(r#"{"strategy": "token-bucket"}"#).unwrap_err();
        assert!(matches!(err, RateLimitError::Config(ConfigError::InvalidOptions(_))));

        let err = LimiterOptions::from_json(r#"{"rejection_status": 200}"#).unwrap_err();
        assert!(matches!(err, RateLimitError::Config(ConfigError::InvalidOptions(_))));
    }

    #[test]
    #[cfg(feature = "moving-window")]
    fn test_builder_uses_configured_strategy() {
        let limiter = Limiter::<()>::builder()
            .options(LimiterOptions {
                strategy: StrategyKind::MovingWindow,
                ..Default::default()
            })
            .build()
            .unwrap();

        assert_eq!(limiter.strategy().name(), "moving_window");
    }

    #[tokio::test]
    async fn test_finish_without_gate_pass_counts_nothing() {
        let limiter = Limiter::<()>::builder().build().unwrap();
        let ctx = limiter.context();

        assert!(!limiter.finish(&ctx, 200).await.unwrap());
    }

    #[tokio::test]
    async fn test_finish_honors_no_hit_status_codes() {
        let limiter = Limiter::<()>::builder().build().unwrap();
        let binding = Arc::new(
            LimitBuilder::<()>::new("1/hour")
                .no_hit_status_codes([404])
                .build("get_items")
                .unwrap(),
        );

        for _ in 0..3 {
            let ctx = limiter.context();
            gate::check(&binding, Some(&ctx), &()).await.unwrap();
            assert!(!limiter.finish(&ctx, 404).await.unwrap());
        }

        let ctx = limiter.context();
        gate::check(&binding, Some(&ctx), &()).await.unwrap();
        assert!(limiter.finish(&ctx, 200).await.unwrap());

        let ctx = limiter.context();
        assert!(gate::check(&binding, Some(&ctx), &()).await.unwrap_err().is_rate_limited());
    }
}
