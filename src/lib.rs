//! ai-relay - Resilient Chat Relay for LLM Providers
//!
//! Accepts chat messages over HTTP and answers them through an ordered chain
//! of upstream LLM providers, hiding transient upstream failures behind
//! retries, per-provider circuit breakers and fallback.
//!
//! ## Core Features
//!
//! - **Error Classification**: every upstream failure mapped to one kind
//! - **Retry**: exponential backoff with jitter and `Retry-After` hints
//! - **Circuit Breaking**: per-provider CLOSED / OPEN / HALF_OPEN gating
//! - **Provider Fallback**: Gemini first, Groq second, by configuration
//! - **Endpoint**: axum server with CORS, rate limiting, correlation ids
//!
//! ## Quick Start
//!
//! ```ignore
//! use ai_relay::{AiService, ConfigLoader};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ConfigLoader::load()?;
//! let service = AiService::from_config(&config)?;
//! let envelope = service
//!     .generate_response("Tell me about your projects", None, None, &CancellationToken::new())
//!     .await;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: classification, retry, circuit breaking, providers, orchestration
//! - [`client`]: relay client with single-flight chat session
//! - [`config`]: layered configuration with profiles
//! - [`server`]: HTTP endpoint

pub mod ai;
pub mod client;
pub mod config;
pub mod constants;
pub mod server;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader, Profile};

// Error Types
pub use types::{ClassifiedError, CorrelationId, ErrorKind, RelayError, Result};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    AiService, AiServiceBuilder, CircuitBreaker, CircuitState, ErrorClassifier, HealthReport,
    RawFailure, RequestEnvelope, RequestOptions, ResponseEnvelope, RetryManager, RetryPolicy,
    with_timeout,
};

// =============================================================================
// Endpoint Re-exports
// =============================================================================

pub use client::{ChatSession, ChatTransport, HttpTransport, SendOutcome, SessionState};
pub use server::{AppState, RelayServer, create_router};
