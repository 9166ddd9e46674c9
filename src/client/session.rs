//! Chat Session
//!
//! Client-side state machine around one conversation turn at a time.
//!
//! ```text
//! Idle ──send──▶ Loading ──ok──▶ Success
//!                   │
//!                   └──fail──▶ Error ──retry──▶ Retrying ──▶ Loading ──▶ …
//!                                │
//!                                └──clear_error──▶ Idle
//! ```
//!
//! A `CANCELLED` answer from the relay (server shutting down) is reported as
//! [`SendOutcome::Superseded`] and returns the session to `Idle` without an
//! error.
//!
//! Only the newest request may write state. Starting a request cancels the
//! previous one and bumps a generation counter; a request that finishes
//! after being superseded reports [`SendOutcome::Superseded`] and leaves the
//! snapshot untouched.

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::transport::ChatTransport;
use crate::ai::{
    RequestEnvelope, RequestOptions, ResponseEnvelope, RetryManager, RetryPolicy, RetryScope,
    SuccessEnvelope,
};
use crate::constants::client as client_constants;
use crate::types::{ClassifiedError, CorrelationId, ErrorKind, RelayError, Result};

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
    Retrying,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Error => "error",
            Self::Retrying => "retrying",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time copy of the session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub response: Option<SuccessEnvelope>,
    pub error: Option<ClassifiedError>,
    pub retry_count: u32,
    pub last_message: Option<String>,
}

/// Result of one send as seen by the caller that issued it
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Success(SuccessEnvelope),
    Failed(ClassifiedError),
    /// A newer request (or a reset) replaced this one
    Superseded,
}

#[derive(Debug, Default)]
struct SessionInner {
    snapshot: SessionSnapshot,
    last_options: Option<RequestOptions>,
    generation: u64,
    in_flight: Option<CancellationToken>,
}

impl SessionInner {
    /// Cancel whatever is running and claim a new generation
    fn supersede(&mut self) -> u64 {
        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
        self.generation += 1;
        self.generation
    }
}

// =============================================================================
// Session
// =============================================================================

pub struct ChatSession<T: ChatTransport> {
    transport: T,
    retry: RetryManager,
    max_retries: u32,
    inner: Mutex<SessionInner>,
}

impl<T: ChatTransport> std::fmt::Debug for ChatSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("retry", &self.retry)
            .field("max_retries", &self.max_retries)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl<T: ChatTransport> ChatSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            retry: RetryManager::new(RetryPolicy::default()),
            max_retries: client_constants::MAX_MANUAL_RETRIES,
            inner: Mutex::new(SessionInner::default()),
        }
    }

    /// Policy for automatic retries of transport failures
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryManager::new(policy);
        self
    }

    /// Manual [`retry`](Self::retry) budget from the error state
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot.clone()
    }

    pub fn state(&self) -> SessionState {
        self.lock().snapshot.state
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state(), SessionState::Loading | SessionState::Retrying)
    }

    pub fn can_retry(&self) -> bool {
        let inner = self.lock();
        Self::retry_allowed(&inner.snapshot, self.max_retries)
    }

    fn retry_allowed(snapshot: &SessionSnapshot, max_retries: u32) -> bool {
        snapshot.state == SessionState::Error
            && snapshot.last_message.is_some()
            && snapshot.retry_count < max_retries
    }

    /// Send a new message, superseding any request in flight.
    ///
    /// A blank message fails locally with `BAD_REQUEST` without touching the
    /// transport.
    pub async fn send_message(
        &self,
        message: &str,
        options: Option<RequestOptions>,
    ) -> SendOutcome {
        if message.trim().is_empty() {
            let error = ClassifiedError::new(
                ErrorKind::BadRequest,
                "Message is required",
                CorrelationId::generate(),
            );
            let mut inner = self.lock();
            inner.supersede();
            inner.snapshot.state = SessionState::Error;
            inner.snapshot.response = None;
            inner.snapshot.error = Some(error.clone());
            inner.snapshot.last_message = None;
            inner.last_options = None;
            return SendOutcome::Failed(error);
        }

        let (generation, token) = {
            let mut inner = self.lock();
            let generation = inner.supersede();
            let token = CancellationToken::new();
            inner.in_flight = Some(token.clone());
            inner.snapshot = SessionSnapshot {
                state: SessionState::Loading,
                last_message: Some(message.to_string()),
                ..Default::default()
            };
            inner.last_options = options;
            (generation, token)
        };

        self.dispatch(message.to_string(), options, generation, token)
            .await
    }

    /// Re-issue the last message from the error state.
    pub async fn retry(&self) -> Result<SendOutcome> {
        let (message, options, generation, token) = {
            let mut inner = self.lock();
            if !Self::retry_allowed(&inner.snapshot, self.max_retries) {
                return Err(RelayError::InvalidState(format!(
                    "cannot retry from state {} (retries used {}/{})",
                    inner.snapshot.state, inner.snapshot.retry_count, self.max_retries
                )));
            }
            let Some(message) = inner.snapshot.last_message.clone() else {
                return Err(RelayError::InvalidState(
                    "no previous message to retry".to_string(),
                ));
            };

            let generation = inner.supersede();
            let token = CancellationToken::new();
            inner.in_flight = Some(token.clone());
            inner.snapshot.state = SessionState::Retrying;
            inner.snapshot.retry_count += 1;
            inner.snapshot.error = None;
            inner.snapshot.response = None;
            (message, inner.last_options, generation, token)
        };

        Ok(self.dispatch(message, options, generation, token).await)
    }

    /// Leave the error state
    pub fn clear_error(&self) {
        let mut inner = self.lock();
        if inner.snapshot.state == SessionState::Error {
            inner.snapshot.state = SessionState::Idle;
            inner.snapshot.error = None;
        }
    }

    /// Abort anything in flight and forget everything
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.supersede();
        inner.snapshot = SessionSnapshot::default();
        inner.last_options = None;
    }

    async fn dispatch(
        &self,
        message: String,
        options: Option<RequestOptions>,
        generation: u64,
        token: CancellationToken,
    ) -> SendOutcome {
        let correlation_id = CorrelationId::generate();
        let request = RequestEnvelope { message, options };

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(correlation_id = %correlation_id, "Request superseded");
                return SendOutcome::Superseded;
            }
            result = self.retry.execute_with_retry(
                RetryScope {
                    label: "relay",
                    correlation_id: &correlation_id,
                    cancel: &token,
                },
                || {
                    self.mark_loading(generation);
                    self.transport.send(&request, &correlation_id)
                },
            ) => result,
        };

        let outcome = match result {
            Ok(ResponseEnvelope::Success(envelope)) => SendOutcome::Success(envelope),
            Ok(ResponseEnvelope::Failure(envelope)) if envelope.kind == ErrorKind::Cancelled => {
                SendOutcome::Superseded
            }
            Ok(ResponseEnvelope::Failure(envelope)) => SendOutcome::Failed(ClassifiedError::new(
                envelope.kind,
                envelope.error,
                envelope.correlation_id,
            )),
            Err(error) if error.kind == ErrorKind::Cancelled => SendOutcome::Superseded,
            Err(error) => SendOutcome::Failed(error),
        };

        let mut inner = self.lock();
        if inner.generation != generation {
            return SendOutcome::Superseded;
        }
        inner.in_flight = None;

        match &outcome {
            SendOutcome::Success(envelope) => {
                inner.snapshot.state = SessionState::Success;
                inner.snapshot.response = Some(envelope.clone());
                inner.snapshot.error = None;
                inner.snapshot.retry_count = 0;
            }
            SendOutcome::Failed(error) => {
                warn!(
                    correlation_id = %error.correlation_id,
                    kind = %error.kind,
                    "Chat request failed"
                );
                inner.snapshot.state = SessionState::Error;
                inner.snapshot.error = Some(error.clone());
            }
            SendOutcome::Superseded => {
                debug!(correlation_id = %correlation_id, "Relay cancelled the request");
                inner.snapshot.state = SessionState::Idle;
                inner.snapshot.error = None;
            }
        }

        outcome
    }

    /// A re-issued request leaves `Retrying` once it is on the wire
    fn mark_loading(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation && inner.snapshot.state == SessionState::Retrying {
            inner.snapshot.state = SessionState::Loading;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
