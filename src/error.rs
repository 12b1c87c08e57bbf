//! Error taxonomy (§7) and its mapping onto [`crate::contract::ErrorCode`].
//!
//! `AdapterError` is what adapter internals and the resilience pipeline deal
//! in; at the adapter boundary it collapses onto the wire-level `ErrorCode`
//! carried by a failure [`crate::contract::Response`].

use thiserror::Error;

use crate::contract::ErrorCode;

/// Errors an adapter's internals (resilience pipeline, quota, rate limiter,
/// cache, wire codec) may raise before they are turned into a `Response`.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("quota exceeded")]
    QuotaExceeded,

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("request timed out")]
    Timeout,

    #[error("circuit breaker open")]
    CircuitOpen,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("http {status}: {message}")]
    Http { status: u16, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Unknown(String),
}

impl AdapterError {
    /// Maps this error onto the wire-level taxonomy of §4.1.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AdapterError::QuotaExceeded => ErrorCode::QuotaExceeded,
            AdapterError::RateLimitExceeded { .. } => ErrorCode::RateLimitExceeded,
            AdapterError::Timeout => ErrorCode::Timeout,
            AdapterError::CircuitOpen => ErrorCode::CircuitOpen,
            AdapterError::Transport(_) => ErrorCode::HttpStatus(599),
            AdapterError::Http { status, .. } => ErrorCode::HttpStatus(*status),
            AdapterError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            AdapterError::InvalidResponse(_) => ErrorCode::InvalidResponse,
            AdapterError::Cancelled => ErrorCode::Cancelled,
            AdapterError::Unknown(_) => ErrorCode::UnknownError,
        }
    }

    /// The default fallback-eligibility classification used when an adapter
    /// does not override `should_fallback` (§4.2, §7). 4xx other than
    /// 408/429 is a client-permanent error; everything else is transient.
    pub fn default_should_fallback(&self) -> bool {
        match self {
            AdapterError::Http { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
            AdapterError::InvalidRequest(_) | AdapterError::Cancelled => false,
            _ => true,
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout
        } else if let Some(status) = err.status() {
            AdapterError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            AdapterError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        AdapterError::InvalidResponse(err.to_string())
    }
}
