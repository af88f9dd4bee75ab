//! Error types for rate limiting operations.
//!
//! Configuration errors surface while limits are being bound at startup.
//! Everything else is raised while a request is being checked or committed:
//! `RateLimitExceeded` is turned into a rejection response at the request
//! boundary, the remaining variants are internal failures.

use std::time::Duration;
use thiserror::Error;

use crate::quota::Quota;

/// Result type for rate limiting operations.
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Main error type for rate limiting operations.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A key resolver failed.
    #[error("Key extraction failed: {0}")]
    KeyExtraction(String),

    /// A filter predicate failed.
    #[error("Filter evaluation failed: {0}")]
    Filter(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// The bucket addressed by the request has no capacity left.
    #[error("Rate limit exceeded: {quota}")]
    RateLimitExceeded {
        /// The limit that was hit.
        quota: Quota,
        /// How long to wait before retrying, when the strategy could tell.
        retry_after: Option<Duration>,
    },
}

impl RateLimitError {
    /// Create a key extraction error for the named resolver.
    pub fn key_extraction(resolver: &str, reason: impl std::fmt::Display) -> Self {
        Self::KeyExtraction(format!("{resolver}: {reason}"))
    }

    /// Create a filter error for the named predicate.
    pub fn filter(predicate: &str, reason: impl std::fmt::Display) -> Self {
        Self::Filter(format!("{predicate}: {reason}"))
    }

    /// Check if this error is a rate limit rejection.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }
}

/// Storage-related errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Generic storage operation failed.
    #[error("{message}")]
    OperationFailed {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Atomic operation failed (CAS conflict).
    #[error("Atomic operation failed, state was modified concurrently")]
    AtomicConflict,
}

impl StorageError {
    /// Create a new operation failed error.
    pub fn operation_failed(message: impl Into<String>, retryable: bool) -> Self {
        Self::OperationFailed {
            message: message.into(),
            retryable,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::OperationFailed { retryable, .. } => *retryable,
            Self::AtomicConflict => true,
            _ => false,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The limit string does not follow the `<amount>/<granularity>` grammar.
    #[error("Invalid limit string {0:?}")]
    InvalidLimit(String),

    /// Invalid quota configuration.
    #[error("Invalid quota: {0}")]
    InvalidQuota(String),

    /// `override_default_keys` was requested without any route key.
    #[error("Can't override default keys when no key is supplied")]
    MissingKeys,

    /// Missing required configuration.
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// Options could not be deserialized.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}
