//! Request-scoped limiter state.
//!
//! The lifecycle controller creates one [`RequestContext`] per request and
//! makes it available to the gate. The gate records the binding it passed
//! and the resolved composite key; the controller takes them back once the
//! response status is known.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::binding::LimitBinding;
use crate::key::KeyFragment;
use crate::limiter::LimiterOptions;
use crate::strategy::CountingStrategy;

/// A gate pass waiting for the response status.
pub struct Triggered<R> {
    /// The binding whose `test` passed.
    pub binding: Arc<LimitBinding<R>>,
    /// The composite key `test` was called with.
    pub keys: Vec<String>,
}

impl<R> std::fmt::Debug for Triggered<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Triggered")
            .field("quota", self.binding.quota())
            .field("keys", &self.keys)
            .finish()
    }
}

/// Limiter state for one in-flight request.
///
/// Cloning is cheap and every clone shares the same triggered slot, so the
/// copy stored in request extensions and the one kept by the controller see
/// the same gate outcome.
pub struct RequestContext<R> {
    strategy: Arc<dyn CountingStrategy>,
    default_keys: Arc<[KeyFragment<R>]>,
    options: Arc<LimiterOptions>,
    triggered: Arc<Mutex<Option<Triggered<R>>>>,
}

impl<R> Clone for RequestContext<R> {
    fn clone(&self) -> Self {
        Self {
            strategy: self.strategy.clone(),
            default_keys: self.default_keys.clone(),
            options: self.options.clone(),
            triggered: self.triggered.clone(),
        }
    }
}

impl<R> std::fmt::Debug for RequestContext<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("strategy", &self.strategy.name())
            .field("default_keys", &self.default_keys)
            .field("triggered", &*self.triggered.lock())
            .finish()
    }
}

impl<R> RequestContext<R> {
    pub(crate) fn new(
        strategy: Arc<dyn CountingStrategy>,
        default_keys: Arc<[KeyFragment<R>]>,
        options: Arc<LimiterOptions>,
    ) -> Self {
        Self {
            strategy,
            default_keys,
            options,
            triggered: Arc::new(Mutex::new(None)),
        }
    }

    /// The active counting strategy.
    pub fn strategy(&self) -> &Arc<dyn CountingStrategy> {
        &self.strategy
    }

    /// Key fragments prepended to every binding that does not override them.
    pub fn default_keys(&self) -> &[KeyFragment<R>] {
        &self.default_keys
    }

    /// Options of the limiter that created this context.
    pub fn options(&self) -> &LimiterOptions {
        &self.options
    }

    /// Record a gate pass.
    ///
    /// Only one binding per request is tracked; a later pass replaces an
    /// earlier one.
    pub fn record(&self, binding: Arc<LimitBinding<R>>, keys: Vec<String>) {
        let previous = self.triggered.lock().replace(Triggered { binding, keys });
        if let Some(previous) = previous {
            tracing::debug!(keys = ?previous.keys, "replacing earlier triggered binding");
        }
    }

    /// Whether a gate passed for this request.
    pub fn is_triggered(&self) -> bool {
        self.triggered.lock().is_some()
    }

    /// Composite key recorded by the gate, if any.
    pub fn triggered_keys(&self) -> Option<Vec<String>> {
        self.triggered.lock().as_ref().map(|t| t.keys.clone())
    }

    /// Take the recorded gate pass, leaving nothing behind.
    pub fn take_triggered(&self) -> Option<Triggered<R>> {
        self.triggered.lock().take()
    }
}
