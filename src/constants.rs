//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Retry manager constants
pub mod retry {
    /// Default total attempts per provider (first call + 3 retries)
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 1000;

    /// Maximum delay between retries (milliseconds)
    pub const MAX_DELAY_MS: u64 = 10_000;

    /// Backoff multiplier
    pub const BACKOFF_MULTIPLIER: f64 = 2.0;

    /// Lower bound of the jitter factor (upper bound is 1.0)
    pub const JITTER_MIN_FACTOR: f64 = 0.5;
}

/// Circuit breaker constants
pub mod circuit_breaker {
    /// Number of consecutive failures before opening circuit
    pub const FAILURE_THRESHOLD: u32 = 3;

    /// Duration to wait before allowing a trial request (seconds)
    pub const RESET_TIMEOUT_SECS: u64 = 30;
}

/// Error classification constants
pub mod classify {
    /// Retry-after assumed for a 429 without a usable header (seconds)
    pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

    /// Upper bound on a provider-supplied retry-after hint (seconds)
    pub const MAX_RETRY_AFTER_SECS: u64 = 300;
}

/// Request validation constants
pub mod validation {
    /// Maximum characters accepted in one chat message
    pub const MAX_MESSAGE_CHARS: usize = 4000;

    /// Maximum accepted length of a caller-supplied correlation id
    pub const MAX_CORRELATION_ID_LEN: usize = 128;
}

/// Generation parameter constants
pub mod generation {
    /// Default sampling temperature
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;

    /// Highest temperature a caller may request
    pub const MAX_TEMPERATURE: f32 = 2.0;

    /// Default output token limit
    pub const DEFAULT_MAX_TOKENS: u32 = 1024;

    /// Highest output token limit a caller may request
    pub const MAX_TOKENS_CEILING: u32 = 4096;

    /// Placeholder returned when a provider succeeds with empty output
    pub const EMPTY_GENERATION_TEXT: &str = "No response generated";
}

/// Endpoint rate limiting constants
pub mod rate_limit {
    /// Sustained requests allowed per client per minute
    pub const REQUESTS_PER_MINUTE: u32 = 30;

    /// Burst capacity per client
    pub const BURST_LIMIT: u32 = 10;
}

/// HTTP/Network constants
pub mod network {
    /// Per-attempt provider timeout (seconds), kept under a 30s serverless limit
    pub const DEFAULT_TIMEOUT_SECS: u64 = 25;

    /// Client-side request timeout against the relay endpoint (seconds)
    pub const CLIENT_TIMEOUT_SECS: u64 = 30;

    /// Default bind address for the HTTP endpoint
    pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

    /// Maximum accepted request body (bytes)
    pub const REQUEST_BODY_LIMIT: usize = 64 * 1024;

    /// Header carrying the correlation id in both directions
    pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
}

/// Client session constants
pub mod client {
    /// Manual retries allowed from the error state
    pub const MAX_MANUAL_RETRIES: u32 = 3;
}
