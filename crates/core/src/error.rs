//! Unified error types for the numwatch engine.
//!
//! Per-item provider failures are absorbed into item statuses and never
//! surface through this type to a client; `Error` covers validation,
//! collaborator (store/stream/sink) failures, and systemic conditions.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the numwatch engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("invalid job transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("store error: {0}")]
    Store(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("export error: {0}")]
    Export(String),

    /// Transient provider failure (timeout, 5xx, flood wait). Retried with
    /// backoff by the caller; degrades to an `unknown` status when exhausted.
    #[error("provider error: {0}")]
    Provider(String),

    /// Provider asked us to slow down. Carries the wait in seconds when the
    /// provider communicated one.
    #[error("rate limited by provider{}", retry_after.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    #[error("no active telegram account available")]
    NoAccountAvailable,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed queue message: missing field {0}")]
    MalformedMessage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether a retry with backoff is worthwhile.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::RateLimited { .. } | Self::Stream(_) | Self::Store(_)
        )
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::MalformedMessage(_) => 400,
            Self::JobNotFound(_) => 404,
            Self::InvalidTransition { .. } => 409,
            Self::RateLimited { .. } => 429,
            _ => 500,
        }
    }
}
