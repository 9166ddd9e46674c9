//! Unified Error Type System
//!
//! Centralized error types for the entire application.
//!
//! ## Error Kinds
//!
//! - **Network / Timeout / Server / RateLimit**: transient upstream trouble (retry)
//! - **ApiKey**: credentials rejected (fail this provider, fall through)
//! - **BadRequest**: the request itself is defective (fail fast everywhere)
//! - **Parse**: malformed upstream body (no retry)
//! - **Configuration**: nothing to call (fail fast, no I/O)
//! - **CircuitOpen**: provider shed by its circuit breaker (fall through)
//! - **Cancelled**: request superseded by the caller (silent)
//! - **Unknown**: unclassified (fail closed)
//!
//! ## Design Principles
//!
//! - One tagged error (`ClassifiedError`) for every upstream failure; routing
//!   decisions match on `ErrorKind`
//! - One application error (`RelayError`) for everything else
//! - No panic/unwrap - all errors are recoverable

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::CorrelationId;

// =============================================================================
// Error Kinds
// =============================================================================

/// Classification of an upstream failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// DNS failure, connection refused, connection reset
    Network,
    /// Per-attempt deadline elapsed
    Timeout,
    /// Upstream returned 429
    RateLimit,
    /// Upstream rejected the credential (401/403)
    ApiKey,
    /// Upstream rejected the request (400/422) or local validation failed
    BadRequest,
    /// Upstream 5xx
    Server,
    /// Upstream body could not be decoded
    Parse,
    /// No provider credentials available
    Configuration,
    /// Provider circuit breaker is open
    CircuitOpen,
    /// Caller abandoned the request
    Cancelled,
    /// Anything else
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "NETWORK",
            Self::Timeout => "TIMEOUT",
            Self::RateLimit => "RATE_LIMIT",
            Self::ApiKey => "API_KEY",
            Self::BadRequest => "BAD_REQUEST",
            Self::Server => "SERVER",
            Self::Parse => "PARSE",
            Self::Configuration => "CONFIGURATION",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::Cancelled => "CANCELLED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Check if a failure of this kind may succeed when repeated against the same provider
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::RateLimit | Self::Server
        )
    }

    /// Check if this kind ends the whole request instead of falling through
    /// to the next provider
    pub fn stops_fallback(&self) -> bool {
        matches!(self, Self::BadRequest | Self::Cancelled | Self::Configuration)
    }

    /// Short, non-technical message safe to show an end user
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::RateLimit => "AI service is busy. Please wait a moment and try again.",
            Self::Timeout => "Request timed out. Please try again.",
            Self::ApiKey | Self::Configuration => {
                "AI service is not properly configured. Please contact support."
            }
            Self::Network => {
                "Unable to connect to AI service. Please check your internet connection."
            }
            Self::Server | Self::CircuitOpen => {
                "AI service is temporarily unavailable. Please try again in a moment."
            }
            Self::BadRequest => "Invalid request. Please check your message and try again.",
            Self::Parse | Self::Cancelled | Self::Unknown => {
                "Something went wrong. Please try again or contact support if the issue persists."
            }
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Classified Error
// =============================================================================

/// Upstream failure after classification, carried through retry, circuit
/// breaker and fallback decisions
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    /// Technical description (logs only, never shown to users)
    pub message: String,
    /// Upstream HTTP status, when one was received
    pub status_code: Option<u16>,
    /// Lower bound for the next backoff delay
    pub retry_after: Option<Duration>,
    pub correlation_id: CorrelationId,
    /// Provider that produced the error
    pub provider: Option<String>,
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.kind, self.message)
        } else {
            write!(f, "[{}] {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for ClassifiedError {}

impl ClassifiedError {
    pub fn new(
        kind: ErrorKind,
        message: impl Into<String>,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            retry_after: None,
            correlation_id,
            provider: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    /// Add provider context to existing error
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// Upstream failure surfaced outside the envelope boundary
    #[error("{0}")]
    Classified(ClassifiedError),

    /// Operation not valid in the current session state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl From<ClassifiedError> for RelayError {
    fn from(err: ClassifiedError) -> Self {
        RelayError::Classified(err)
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

// =============================================================================
// Tests
// =============================================================================
