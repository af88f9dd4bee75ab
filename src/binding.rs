//! Per-route limit configuration.
//!
//! A [`LimitBinding`] ties one [`Quota`] to the key fragments, filters and
//! no-hit status codes of a single route. Bindings are built once at setup
//! through [`LimitBuilder`]; every validation error surfaces from `build`,
//! never while serving a request.
//!
//! # Key composition
//!
//! With `override_default_keys` off (the default) a request is counted
//! against
//!
//! ```text
//! [limiter default keys..] ++ [handler identifier] ++ [route keys..]
//! ```
//!
//! The handler identifier gives every route its own bucket even when no
//! explicit key is configured. With `override_default_keys` on, only the
//! route keys are used, and at least one must be supplied.
//!
//! # Example
//!
//! ```ignore
//! use routelimit::binding::LimitBuilder;
//! use routelimit::filter::FnFilter;
//!
//! let binding = LimitBuilder::new("10/minute")
//!     .key("search")
//!     .filter(FnFilter::new("not_internal", |req: &Parts| {
//!         req.headers.get("x-internal").is_none()
//!     }))
//!     .no_hit_status_codes([404])
//!     .build("search_items")?;
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::filter::Filter;
use crate::key::{resolve_keys, Key, KeyFragment, RouteKey};
use crate::quota::Quota;

/// A limit bound to one route.
pub struct LimitBinding<R> {
    quota: Quota,
    identifier: KeyFragment<R>,
    route_keys: Vec<KeyFragment<R>>,
    override_default_keys: bool,
    filters: Vec<Arc<dyn Filter<R>>>,
    no_hit_status_codes: HashSet<u16>,
}

impl<R> std::fmt::Debug for LimitBinding<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimitBinding")
            .field("quota", &self.quota)
            .field("identifier", &self.identifier)
            .field("route_keys", &self.route_keys)
            .field("override_default_keys", &self.override_default_keys)
            .field("filters", &self.filters.len())
            .field("no_hit_status_codes", &self.no_hit_status_codes)
            .finish()
    }
}

impl<R> LimitBinding<R> {
    /// The bound limit.
    pub fn quota(&self) -> &Quota {
        &self.quota
    }

    /// Filters that must all hold for a request to be metered.
    pub fn filters(&self) -> &[Arc<dyn Filter<R>>] {
        &self.filters
    }

    /// Whether default keys are replaced by the route keys.
    pub fn overrides_default_keys(&self) -> bool {
        self.override_default_keys
    }

    /// Whether a response with this status consumes quota.
    pub fn counts_status(&self, status: u16) -> bool {
        !self.no_hit_status_codes.contains(&status)
    }

    /// Fragments making up the composite key, in resolution order.
    pub fn fragments<'a>(
        &'a self,
        default_keys: &'a [KeyFragment<R>],
    ) -> impl Iterator<Item = &'a KeyFragment<R>> + Send + 'a {
        let (defaults, identifier): (&[KeyFragment<R>], Option<&KeyFragment<R>>) =
            if self.override_default_keys {
                (&[], None)
            } else {
                (default_keys, Some(&self.identifier))
            };

        defaults
            .iter()
            .chain(identifier)
            .chain(self.route_keys.iter())
    }

    /// Resolve the composite key for a request.
    pub async fn resolve_keys(
        &self,
        default_keys: &[KeyFragment<R>],
        request: &R,
    ) -> Result<Vec<String>> {
        resolve_keys(self.fragments(default_keys), request).await
    }
}

/// Builder for [`LimitBinding`].
pub struct LimitBuilder<R> {
    limit: String,
    keys: Vec<KeyFragment<R>>,
    filters: Vec<Arc<dyn Filter<R>>>,
    no_hit_status_codes: HashSet<u16>,
    override_default_keys: bool,
}

impl<R> LimitBuilder<R> {
    /// Start a binding for a limit string such as `"5/minute"`.
    pub fn new(limit: impl Into<String>) -> Self {
        Self {
            limit: limit.into(),
            keys: Vec::new(),
            filters: Vec::new(),
            no_hit_status_codes: HashSet::new(),
            override_default_keys: false,
        }
    }

    /// Append a route key (literal string or resolver).
    pub fn key(mut self, fragment: impl Into<KeyFragment<R>>) -> Self {
        self.keys.push(fragment.into());
        self
    }

    /// Append a route key resolved from the request.
    pub fn key_resolver(mut self, key: impl Key<R> + 'static) -> Self {
        self.keys.push(KeyFragment::resolver(key));
        self
    }

    /// Append a filter.
    pub fn filter(mut self, filter: impl Filter<R> + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Responses with any of these statuses do not consume quota.
    pub fn no_hit_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.no_hit_status_codes.extend(codes);
        self
    }

    /// Use only the route keys, dropping default keys and the handler identifier.
    pub fn override_default_keys(mut self, override_default_keys: bool) -> Self {
        self.override_default_keys = override_default_keys;
        self
    }

    /// Build a binding for the handler named `handler`.
    pub fn build(self, handler: impl Into<String>) -> Result<LimitBinding<R>> {
        self.finish(KeyFragment::Literal(handler.into()))
    }

    /// Build a binding identified by the route each request matched.
    ///
    /// Used when one binding covers several routes: each route still gets
    /// its own bucket unless default keys are overridden.
    pub fn build_routed(self) -> Result<LimitBinding<R>>
    where
        RouteKey: Key<R>,
    {
        self.finish(KeyFragment::resolver(RouteKey::new()))
    }

    fn finish(self, identifier: KeyFragment<R>) -> Result<LimitBinding<R>> {
        let quota = Quota::parse(&self.limit)?;

        if self.override_default_keys && self.keys.is_empty() {
            return Err(ConfigError::MissingKeys.into());
        }

        Ok(LimitBinding {
            quota,
            identifier,
            route_keys: self.keys,
            override_default_keys: self.override_default_keys,
            filters: self.filters,
            no_hit_status_codes: self.no_hit_status_codes,
        })
    }
}

/// Serializable form of a binding's static settings.
///
/// Resolver keys and filters cannot be expressed in configuration files; add
/// them to the builder after conversion.
///
/// ```ignore
/// let config: LimitConfig =
///     serde_json::from_str(r#"{"limit": "5/minute", "no_hit_status_codes": [404]}"#)?;
/// let binding = LimitBuilder::from(config).build("get_items")?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Limit string, e.g. `"5/minute"` or `"10 per 2 hours"`.
    pub limit: String,
    /// Literal route keys.
    #[serde(default)]
    pub keys: Vec<String>,
    /// Statuses that do not consume quota.
    #[serde(default)]
    pub no_hit_status_codes: Vec<u16>,
    /// Use only the route keys.
    #[serde(default)]
    pub override_default_keys: bool,
}

impl<R> From<LimitConfig> for LimitBuilder<R> {
    fn from(config: LimitConfig) -> Self {
        config
            .keys
            .into_iter()
            .fold(LimitBuilder::new(config.limit), LimitBuilder::key)
            .no_hit_status_codes(config.no_hit_status_codes)
            .override_default_keys(config.override_default_keys)
    }
}
