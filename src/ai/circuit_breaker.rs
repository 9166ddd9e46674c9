//! Circuit Breaker Pattern for Provider Resilience
//!
//! Sheds load from a provider that keeps failing instead of retrying it
//! pointlessly. One breaker exists per provider, owned by the orchestration
//! service, and wraps the *retried* operation: a whole retry storm is one
//! observed outcome.
//!
//! ## States
//!
//! - **Closed**: Normal operation, requests flow through
//! - **Open**: Provider is failing, requests are rejected immediately
//! - **HalfOpen**: One trial request is allowed to test recovery
//!
//! ## Transitions
//!
//! ```text
//! Closed --[failure_threshold consecutive failures]--> Open
//! Open --[reset_timeout elapsed]--> HalfOpen
//! HalfOpen --[trial success]--> Closed
//! HalfOpen --[trial failure]--> Open (timer restarted)
//! ```
//!
//! Every state change starts a new epoch. An outcome only counts in the
//! epoch it was admitted in, so a slow request admitted while CLOSED cannot
//! settle a later HALF_OPEN trial.

use std::future::Future;
use std::sync::RwLock;
use std::time::Duration;

use tokio::time::Instant;

use super::classifier::{ErrorClassifier, RawFailure};
use crate::constants::circuit_breaker as cb_constants;
use crate::types::{ClassifiedError, CorrelationId, ErrorKind};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests flow through
    Closed,
    /// Provider is failing - requests rejected immediately
    Open,
    /// Testing recovery - a single trial request allowed
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// When false, `execute` is a pass-through and state never changes
    pub enabled: bool,
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// Duration to wait before transitioning from open to half-open
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: cb_constants::FAILURE_THRESHOLD,
            reset_timeout: Duration::from_secs(cb_constants::RESET_TIMEOUT_SECS),
        }
    }
}

impl CircuitBreakerConfig {
    /// Breaker that never trips
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

/// How a request was let through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Admission {
    trial: bool,
    epoch: u64,
}

/// Unified internal state - all mutable state in single struct
/// to ensure atomicity of state transitions
#[derive(Debug)]
struct CircuitBreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    blocked_count: u64,
    /// Bumped on every state change
    epoch: u64,
}

impl CircuitBreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            trial_in_flight: false,
            blocked_count: 0,
            epoch: 0,
        }
    }

    fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.trial_in_flight = false;
        self.epoch += 1;
    }

    fn trip(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.trial_in_flight = false;
        self.epoch += 1;
    }

    /// `None` is an unconditional record
    fn is_current(&self, epoch: Option<u64>) -> bool {
        epoch.is_none_or(|epoch| epoch == self.epoch)
    }

    /// Open -> HalfOpen once the cooldown has elapsed
    fn refresh(&mut self, reset_timeout: Duration) -> bool {
        let cooled_down = self.state == CircuitState::Open
            && self
                .opened_at
                .is_some_and(|opened_at| opened_at.elapsed() >= reset_timeout);

        if cooled_down {
            self.state = CircuitState::HalfOpen;
            self.opened_at = None;
            self.trial_in_flight = false;
            self.epoch += 1;
        }
        cooled_down
    }
}

/// Thread-safe circuit breaker with unified state management.
///
/// All state is protected by a single RwLock to ensure consistency
/// between failure counts and state transitions.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    provider_name: String,
    inner: RwLock<CircuitBreakerInner>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("provider_name", &self.provider_name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker for a provider
    pub fn new(provider_name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            provider_name: provider_name.into(),
            inner: RwLock::new(CircuitBreakerInner::new()),
        }
    }

    /// Create with default configuration
    pub fn with_defaults(provider_name: impl Into<String>) -> Self {
        Self::new(provider_name, CircuitBreakerConfig::default())
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Run `operation` unless the circuit rejects it.
    ///
    /// A rejected call fails with `CIRCUIT_OPEN` without invoking
    /// `operation`. Cancelled and bad-request outcomes are not counted
    /// against the provider, and neither is an outcome that arrives after
    /// the circuit has changed state since admission.
    pub async fn execute<T, F, Fut>(
        &self,
        correlation_id: &CorrelationId,
        operation: F,
    ) -> Result<T, ClassifiedError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ClassifiedError>>,
    {
        if !self.config.enabled {
            return operation().await;
        }

        let Some(admission) = self.try_acquire() else {
            return Err(ErrorClassifier::classify(
                &RawFailure::CircuitOpen {
                    provider: self.provider_name.clone(),
                },
                correlation_id,
            ));
        };

        let mut guard = TrialGuard {
            breaker: self,
            epoch: admission.epoch,
            armed: admission.trial,
        };

        let result = operation().await;
        guard.armed = false;

        match &result {
            Ok(_) => self.apply_success(Some(admission.epoch)),
            Err(err) if counts_against_provider(err.kind) => {
                self.apply_failure(Some(admission.epoch))
            }
            Err(_) => {
                if admission.trial {
                    self.release_trial(admission.epoch);
                }
            }
        }

        result
    }

    /// Get current circuit state (checking for timeout transitions)
    pub fn state(&self) -> CircuitState {
        self.check_state_transition();

        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .state
    }

    /// Check if request should be allowed
    ///
    /// Returns `true` if the request can proceed, `false` if circuit is open
    /// or a half-open trial is already running.
    pub fn allow_request(&self) -> bool {
        !self.config.enabled || self.try_acquire().is_some()
    }

    fn try_acquire(&self) -> Option<Admission> {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if inner.refresh(self.config.reset_timeout) {
            tracing::info!(
                "Circuit breaker [{}]: Transitioning to HALF_OPEN (testing recovery)",
                self.provider_name
            );
        }

        match inner.state {
            CircuitState::Closed => Some(Admission {
                trial: false,
                epoch: inner.epoch,
            }),
            CircuitState::Open => {
                inner.blocked_count += 1;
                tracing::debug!(
                    "Circuit breaker [{}]: Request blocked (circuit OPEN)",
                    self.provider_name
                );
                None
            }
            CircuitState::HalfOpen if inner.trial_in_flight => {
                inner.blocked_count += 1;
                tracing::debug!(
                    "Circuit breaker [{}]: Trial already in flight",
                    self.provider_name
                );
                None
            }
            CircuitState::HalfOpen => {
                inner.trial_in_flight = true;
                tracing::debug!(
                    "Circuit breaker [{}]: Allowing trial request",
                    self.provider_name
                );
                Some(Admission {
                    trial: true,
                    epoch: inner.epoch,
                })
            }
        }
    }

    /// Record a successful request
    pub fn record_success(&self) {
        self.apply_success(None);
    }

    /// Record a failed request
    pub fn record_failure(&self) {
        self.apply_failure(None);
    }

    fn apply_success(&self, epoch: Option<u64>) {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !inner.is_current(epoch) {
            tracing::debug!(
                "Circuit breaker [{}]: Ignoring success from an earlier state",
                self.provider_name
            );
            return;
        }

        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.reset();
                tracing::info!(
                    "Circuit breaker [{}]: Closed (provider recovered)",
                    self.provider_name
                );
            }
            CircuitState::Open => inner.reset(),
        }
    }

    fn apply_failure(&self, epoch: Option<u64>) {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !inner.is_current(epoch) {
            tracing::debug!(
                "Circuit breaker [{}]: Ignoring failure from an earlier state",
                self.provider_name
            );
            return;
        }

        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.trip();

                    tracing::warn!(
                        "Circuit breaker [{}]: Opened after {} failures (timeout: {:?})",
                        self.provider_name,
                        inner.consecutive_failures,
                        self.config.reset_timeout
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.trip();

                tracing::warn!(
                    "Circuit breaker [{}]: Re-opened after failure in half-open state",
                    self.provider_name
                );
            }
            CircuitState::Open => {
                // Already open, timer keeps running
            }
        }
    }

    fn release_trial(&self, epoch: u64) {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if inner.state == CircuitState::HalfOpen && inner.epoch == epoch {
            inner.trial_in_flight = false;
        }
    }

    /// Get statistics for monitoring
    pub fn stats(&self) -> CircuitBreakerStats {
        self.check_state_transition();

        let inner = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        CircuitBreakerStats {
            provider_name: self.provider_name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            failure_threshold: self.config.failure_threshold,
            blocked_count: inner.blocked_count,
            time_in_state: inner.opened_at.map(|t| t.elapsed()),
        }
    }

    /// Force reset to closed state (for manual intervention)
    pub fn reset(&self) {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        inner.reset();

        tracing::info!(
            "Circuit breaker [{}]: Manually reset to CLOSED",
            self.provider_name
        );
    }

    /// Check if state transition is needed (open -> half-open)
    fn check_state_transition(&self) {
        let should_transition = {
            let inner = self
                .inner
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            inner.state == CircuitState::Open
                && inner
                    .opened_at
                    .is_some_and(|opened_at| opened_at.elapsed() >= self.config.reset_timeout)
        };

        if should_transition {
            let mut inner = self
                .inner
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            // Double-check state (may have changed between read and write)
            if inner.refresh(self.config.reset_timeout) {
                tracing::info!(
                    "Circuit breaker [{}]: Transitioning to HALF_OPEN (testing recovery)",
                    self.provider_name
                );
            }
        }
    }
}

/// Frees the half-open trial slot if the trial future is dropped mid-flight
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    epoch: u64,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_trial(self.epoch);
        }
    }
}

fn counts_against_provider(kind: ErrorKind) -> bool {
    !matches!(
        kind,
        ErrorKind::Cancelled | ErrorKind::BadRequest | ErrorKind::CircuitOpen
    )
}

/// Statistics for monitoring circuit breaker state
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub provider_name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub blocked_count: u64,
    pub time_in_state: Option<Duration>,
}

impl CircuitBreakerStats {
    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        let time_str = self
            .time_in_state
            .map(|d| format!(" for {:.1}s", d.as_secs_f64()))
            .unwrap_or_default();

        format!(
            "[{}] {} | failures={}/{} blocked={}{}",
            self.provider_name,
            self.state,
            self.consecutive_failures,
            self.failure_threshold,
            self.blocked_count,
            time_str
        )
    }
}
