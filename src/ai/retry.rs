//! Retry Manager
//!
//! Re-invokes an asynchronous operation with exponential backoff and jitter
//! until it succeeds, fails with a non-retryable error, or exhausts its
//! attempt budget.
//!
//! ## Delay
//!
//! ```text
//! delay(k) = min(base * multiplier^k, max)      k = 0 for the first retry
//!          * U[0.5, 1.0]                        when jitter is enabled
//!          raised to retry_after, then capped at max
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::classifier::{ErrorClassifier, RawFailure};
use crate::constants::retry as retry_constants;
use crate::types::{ClassifiedError, CorrelationId, RelayError, Result};

/// Backoff configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total invocations allowed, including the first (>= 1)
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Growth factor per retry (> 1)
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: retry_constants::DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(retry_constants::BASE_DELAY_MS),
            max_delay: Duration::from_millis(retry_constants::MAX_DELAY_MS),
            backoff_multiplier: retry_constants::BACKOFF_MULTIPLIER,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Pass-through policy: the first failure is terminal
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(RelayError::Config(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier <= 1.0 {
            return Err(RelayError::Config(format!(
                "retry backoff_multiplier must be greater than 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }

    /// Compute the sleep before retry `attempt_index` (0 = first retry).
    ///
    /// `jitter_factor` is clamped to `[0.5, 1.0]` and ignored when jitter is
    /// disabled. The result is whole milliseconds within `[0, max_delay]`.
    pub fn delay_for(
        &self,
        attempt_index: u32,
        retry_after: Option<Duration>,
        jitter_factor: f64,
    ) -> Duration {
        let max_ms = self.max_delay.as_millis() as f64;
        let exponent = attempt_index.min(i32::MAX as u32) as i32;
        let raw = self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);

        // NaN/inf from huge exponents collapse onto the ceiling
        let mut delay_ms = if raw.is_finite() {
            raw.clamp(0.0, max_ms)
        } else {
            max_ms
        };

        if self.jitter {
            let factor = if jitter_factor.is_finite() {
                jitter_factor.clamp(retry_constants::JITTER_MIN_FACTOR, 1.0)
            } else {
                1.0
            };
            delay_ms *= factor;
        }

        if let Some(hint) = retry_after {
            delay_ms = delay_ms.max(hint.as_millis() as f64);
        }

        Duration::from_millis(delay_ms.min(max_ms).floor() as u64)
    }
}

/// Per-call context for logging and cancellation
#[derive(Debug, Clone, Copy)]
pub struct RetryScope<'a> {
    /// What is being retried (provider name, endpoint)
    pub label: &'a str,
    pub correlation_id: &'a CorrelationId,
    pub cancel: &'a CancellationToken,
}

/// Executes operations under a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct RetryManager {
    policy: RetryPolicy,
}

impl RetryManager {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until success, a non-retryable error, or exhaustion.
    ///
    /// Attempts are strictly sequential. Cancellation during a backoff sleep
    /// ends the loop with a `CANCELLED` error without another attempt.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        scope: RetryScope<'_>,
        mut operation: F,
    ) -> std::result::Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RawFailure>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            let failure = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(
                            label = scope.label,
                            correlation_id = %scope.correlation_id,
                            attempt = attempt + 1,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            let error = ErrorClassifier::classify(&failure, scope.correlation_id);

            if !error.is_retryable() {
                debug!(
                    label = scope.label,
                    correlation_id = %scope.correlation_id,
                    kind = %error.kind,
                    "Non-retryable failure"
                );
                return Err(error);
            }

            if attempt + 1 >= max_attempts {
                warn!(
                    label = scope.label,
                    correlation_id = %scope.correlation_id,
                    kind = %error.kind,
                    attempts = attempt + 1,
                    "Retry budget exhausted"
                );
                return Err(error);
            }

            let jitter_factor = rand::rng().random_range(retry_constants::JITTER_MIN_FACTOR..=1.0);
            let delay = self
                .policy
                .delay_for(attempt, error.retry_after, jitter_factor);

            warn!(
                label = scope.label,
                correlation_id = %scope.correlation_id,
                kind = %error.kind,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Attempt failed, retrying"
            );

            tokio::select! {
                biased;
                _ = scope.cancel.cancelled() => {
                    return Err(ErrorClassifier::classify(&RawFailure::Cancelled, scope.correlation_id));
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
