//! AI Integration Layer
//!
//! Resilient access to upstream LLM providers: classification, retry,
//! circuit breaking, timeouts, provider fallback and endpoint rate limiting.

pub mod circuit_breaker;
pub mod classifier;
pub mod envelope;
pub mod provider;
pub mod rate_limit;
pub mod retry;
pub mod service;
pub mod timeout;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use classifier::{ErrorClassifier, RawFailure};
pub use envelope::{
    FailureEnvelope, HealthReport, HealthStatus, ProviderHealth, RequestEnvelope, RequestOptions,
    ResponseEnvelope, SuccessEnvelope,
};
pub use provider::{
    Generation, GenerationRequest, ProviderAdapter, ProviderDescriptor, SharedAdapter,
    create_adapter,
};
pub use rate_limit::RateLimiter;
pub use retry::{RetryManager, RetryPolicy, RetryScope};
pub use service::{AiService, AiServiceBuilder};
pub use timeout::with_timeout;
