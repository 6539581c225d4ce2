//! Error taxonomy shared by every subsystem.
//!
//! Internal code produces [`RawError`]s, which may carry upstream text and
//! therefore secrets. Nothing leaves the crate until the sanitizer has turned
//! it into a [`ClassifiedError`].

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::pool::transport::TransportError;
use crate::resilience::circuit_breaker::CircuitState;
use crate::security::validator::ValidationError;

/// Stable, programmatically matchable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
    #[serde(rename = "TIMEOUT")]
    Timeout,
    #[serde(rename = "CONNECTION_ERROR")]
    ConnectionError,
    #[serde(rename = "UPSTREAM_4XX")]
    Upstream4xx,
    #[serde(rename = "UPSTREAM_5XX")]
    Upstream5xx,
    #[serde(rename = "BREAKER_OPEN")]
    BreakerOpen,
    #[serde(rename = "RETRIES_EXHAUSTED")]
    RetriesExhausted,
    #[serde(rename = "SERIALIZATION_ERROR")]
    SerializationError,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::ConnectionError => "CONNECTION_ERROR",
            Self::Upstream4xx => "UPSTREAM_4XX",
            Self::Upstream5xx => "UPSTREAM_5XX",
            Self::BreakerOpen => "BREAKER_OPEN",
            Self::RetriesExhausted => "RETRIES_EXHAUSTED",
            Self::SerializationError => "SERIALIZATION_ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unsanitized failure as produced inside the crate.
#[derive(Debug, Clone, Error)]
pub enum RawError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("upstream returned HTTP {status}")]
    Upstream {
        status: u16,
        code: Option<String>,
        message: Option<String>,
    },

    /// A 2xx envelope carrying `success: false`.
    #[error("upstream rejected the request")]
    Rejected {
        code: Option<String>,
        message: Option<String>,
    },

    #[error("failed to decode upstream response: {0}")]
    Serialization(String),

    #[error("circuit breaker is {state}; next trial in {retry_after:?}")]
    BreakerOpen {
        state: CircuitState,
        retry_after: Duration,
    },

    #[error("all {attempts} attempts failed; last error: {last}")]
    RetriesExhausted { attempts: u32, last: Box<RawError> },

    #[error("{0}")]
    Other(String),
}

impl RawError {
    /// Taxonomy kind of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Transport(err) => err.kind(),
            Self::Upstream { status, .. } if *status >= 500 => ErrorKind::Upstream5xx,
            Self::Upstream { .. } => ErrorKind::Upstream4xx,
            Self::Rejected { .. } => ErrorKind::Unknown,
            Self::Serialization(_) => ErrorKind::SerializationError,
            Self::BreakerOpen { .. } => ErrorKind::BreakerOpen,
            Self::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            Self::Other(_) => ErrorKind::Unknown,
        }
    }

    /// HTTP status reported by the upstream, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            Self::RetriesExhausted { last, .. } => last.status_code(),
            _ => None,
        }
    }
}

/// Sanitized error: the only error shape that leaves the crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    /// Taxonomy code.
    pub kind: ErrorKind,
    /// Human-readable, credential-free message.
    pub message: String,
    /// Upstream HTTP status, when one was received.
    pub status_code: Option<u16>,
    /// Validation sub-code or upstream error code.
    pub detail_code: Option<String>,
    /// Underlying kind of the final attempt, for `RETRIES_EXHAUSTED`.
    pub last_kind: Option<ErrorKind>,
    /// Network attempts made before this error was returned.
    pub attempts: u32,
}
