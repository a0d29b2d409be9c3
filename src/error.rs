//! Kaupang error types

use std::time::Duration;

/// Kaupang error types
#[derive(Debug, thiserror::Error)]
pub enum KaupangError {
    // Upstream/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Upstream answered 200 but the body held no usable payload
    /// (empty, not a JSON object, or unparseable).
    ///
    /// Retried like any transient fault; once a transport exhausts its
    /// attempts the chain falls through to the next one.
    #[error("empty or unusable upstream response")]
    EmptyResponse,

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Store/coordination errors
    #[error("cache store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("lock wait exceeded {waited_ms}ms")]
    LockTimeout { waited_ms: u64 },

    // Configuration errors
    #[error("no transport configured")]
    NoTransport,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl KaupangError {
    /// Whether a retry of the same operation could plausibly succeed.
    ///
    /// Network failures, rate limits, unusable success bodies,
    /// server-side errors, and store outages are transient. Data and
    /// configuration problems are not.
    pub fn is_transient(&self) -> bool {
        match self {
            KaupangError::Http(_)
            | KaupangError::RateLimited { .. }
            | KaupangError::EmptyResponse
            | KaupangError::StoreUnavailable(_)
            | KaupangError::LockTimeout { .. } => true,
            KaupangError::Api { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            _ => false,
        }
    }

    /// Server-provided delay hint, if any.
    ///
    /// Only `RateLimited` carries one; retry logic gives it precedence
    /// over calculated backoff.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            KaupangError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Result type alias for Kaupang operations
pub type Result<T> = std::result::Result<T, KaupangError>;
