//! AI Orchestration Service
//!
//! Validates a chat message, then walks the providers in priority order.
//! Each provider call is layered as
//!
//! ```text
//! CircuitBreaker::execute(
//!     RetryManager::execute_with_retry(
//!         with_timeout(adapter.call)))
//! ```
//!
//! so one retry storm counts as one breaker outcome. The first success wins;
//! a `BAD_REQUEST` or `CANCELLED` outcome ends the walk; every other failure
//! falls through to the next provider.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
};
use super::envelope::{HealthReport, HealthStatus, ProviderHealth, RequestOptions, ResponseEnvelope};
use super::provider::prompt::DEFAULT_SYSTEM_PROMPT;
use super::provider::{
    Generation, GenerationRequest, ProviderDescriptor, SharedAdapter, create_adapter,
};
use super::retry::{RetryManager, RetryPolicy, RetryScope};
use super::timeout::with_timeout;
use crate::config::Config;
use crate::constants::{generation, network, validation};
use crate::types::{ClassifiedError, CorrelationId, ErrorKind, RelayError, Result};

/// Adapter plus its generation defaults
#[derive(Clone)]
struct ChainedAdapter {
    adapter: SharedAdapter,
    temperature: f32,
    max_tokens: u32,
}

impl ChainedAdapter {
    fn request(
        &self,
        message: &str,
        system_prompt: &str,
        options: Option<RequestOptions>,
    ) -> GenerationRequest {
        let options = options.unwrap_or_default();
        let temperature = options
            .temperature
            .filter(|t| t.is_finite())
            .unwrap_or(self.temperature)
            .clamp(0.0, generation::MAX_TEMPERATURE);
        let max_tokens = options
            .max_tokens
            .unwrap_or(self.max_tokens)
            .clamp(1, generation::MAX_TOKENS_CEILING);

        GenerationRequest {
            message: message.to_string(),
            system_prompt: system_prompt.to_string(),
            temperature,
            max_tokens,
        }
    }
}

/// Orchestrates providers with retry, circuit breaking and fallback
pub struct AiService {
    /// Configured providers in priority order
    providers: Vec<ChainedAdapter>,
    /// Known providers without credentials (reported by `health`)
    unconfigured: Vec<String>,
    /// One breaker per configured provider, shared across concurrent requests
    circuit_breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
    breaker_config: CircuitBreakerConfig,
    retry: RetryManager,
    timeout: Duration,
    system_prompt: String,
    max_message_chars: usize,
}

impl std::fmt::Debug for AiService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiService")
            .field("providers", &self.provider_names())
            .field("unconfigured", &self.unconfigured)
            .field("retry", self.retry.policy())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AiService {
    pub fn builder() -> AiServiceBuilder {
        AiServiceBuilder::new()
    }

    /// Build the service from configuration.
    ///
    /// This is the only place credentials are read: the configured
    /// `api_key`, else the `<NAME>_API_KEY` environment variable. Providers
    /// without a credential are left out of the rotation.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let mut builder = Self::builder()
            .with_retry_policy(config.retry.to_policy())
            .with_circuit_breaker(config.circuit_breaker.to_config())
            .with_timeout(config.providers.timeout())
            .with_system_prompt(config.prompt.system_prompt.clone())
            .with_max_message_chars(config.validation.max_message_chars);

        for name in &config.providers.priority {
            let settings = config.providers.settings(name).ok_or_else(|| {
                RelayError::Config(format!("Unknown provider: {}", name))
            })?;

            let credential = settings
                .enabled
                .then(|| {
                    settings
                        .api_key
                        .clone()
                        .or_else(|| std::env::var(format!("{}_API_KEY", name.to_uppercase())).ok())
                })
                .flatten()
                .filter(|key| !key.trim().is_empty());

            match credential {
                Some(key) => {
                    let descriptor = ProviderDescriptor::new(
                        name.as_str(),
                        SecretString::from(key),
                        settings.api_base.as_str(),
                        settings.model.as_str(),
                    )
                    .with_timeout(config.providers.timeout());

                    builder = builder.add_adapter_with_defaults(
                        create_adapter(descriptor)?,
                        settings.temperature,
                        settings.max_tokens,
                    );
                }
                None => {
                    debug!(provider = %name, "Provider has no credential, skipping");
                    builder = builder.add_unconfigured(name.as_str());
                }
            }
        }

        let service = builder.build();
        info!(
            providers = ?service.provider_names(),
            profile = %config.profile,
            "AI service initialized"
        );
        Ok(service)
    }

    /// Names of configured providers in priority order
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.adapter.name()).collect()
    }

    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Generate a reply for one chat message.
    ///
    /// Always resolves to an envelope; upstream failures never escape as
    /// errors. The correlation id is the caller's when supplied, else a
    /// fresh one.
    #[instrument(skip(self, message, options, correlation_id, cancel), fields(correlation_id))]
    pub async fn generate_response(
        &self,
        message: &str,
        options: Option<RequestOptions>,
        correlation_id: Option<CorrelationId>,
        cancel: &CancellationToken,
    ) -> ResponseEnvelope {
        let correlation_id = correlation_id.unwrap_or_else(CorrelationId::generate);
        tracing::Span::current().record("correlation_id", tracing::field::display(&correlation_id));

        let message = message.trim();
        if message.is_empty() || message.chars().count() > self.max_message_chars {
            warn!(
                correlation_id = %correlation_id,
                chars = message.chars().count(),
                max_chars = self.max_message_chars,
                "Rejected invalid message"
            );
            return ResponseEnvelope::failure(ErrorKind::BadRequest, correlation_id);
        }

        if self.providers.is_empty() {
            error!(correlation_id = %correlation_id, "No AI providers configured");
            return ResponseEnvelope::failure(ErrorKind::Configuration, correlation_id);
        }

        let mut failures: Vec<ClassifiedError> = Vec::new();

        for entry in &self.providers {
            let provider_name = entry.adapter.name();
            let request = entry.request(message, &self.system_prompt, options);
            let breaker = self.breaker(provider_name);

            debug!(
                provider = %provider_name,
                circuit = %breaker.state(),
                "Trying provider"
            );

            let outcome = breaker
                .execute(&correlation_id, || {
                    self.call_with_retry(&entry.adapter, &request, &correlation_id, cancel)
                })
                .await;

            match outcome {
                Ok(generation) => {
                    info!(
                        provider = %provider_name,
                        model = %generation.model,
                        failed_providers = failures.len(),
                        "Generation succeeded"
                    );
                    return ResponseEnvelope::success(
                        generation.text,
                        generation.model,
                        provider_name,
                        generation.usage,
                        correlation_id,
                    );
                }
                Err(err) => {
                    let err = if err.provider.is_some() {
                        err
                    } else {
                        err.provider(provider_name)
                    };

                    warn!(
                        correlation_id = %correlation_id,
                        provider = %provider_name,
                        kind = %err.kind,
                        status = ?err.status_code,
                        error = %err.message,
                        "Provider failed"
                    );

                    let stop = err.kind.stops_fallback();
                    failures.push(err);

                    if stop {
                        debug!(provider = %provider_name, "Failure ends provider fallback");
                        break;
                    }
                }
            }
        }

        let summary: Vec<String> = failures.iter().map(ToString::to_string).collect();
        info!(
            correlation_id = %correlation_id,
            failures = ?summary,
            "All providers failed"
        );

        let kind = failures
            .last()
            .map(|err| err.kind)
            .unwrap_or(ErrorKind::Unknown);
        ResponseEnvelope::failure(kind, correlation_id)
    }

    async fn call_with_retry(
        &self,
        adapter: &SharedAdapter,
        request: &GenerationRequest,
        correlation_id: &CorrelationId,
        cancel: &CancellationToken,
    ) -> std::result::Result<Generation, ClassifiedError> {
        let scope = RetryScope {
            label: adapter.name(),
            correlation_id,
            cancel,
        };

        self.retry
            .execute_with_retry(scope, || with_timeout(self.timeout, cancel, adapter.call(request)))
            .await
            .map_err(|err| err.provider(adapter.name()))
    }

    fn breaker(&self, provider_name: &str) -> Arc<CircuitBreaker> {
        self.circuit_breakers
            .entry(provider_name.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(provider_name, self.breaker_config.clone()))
            })
            .clone()
    }

    /// Configuration and circuit overview. Makes no network calls.
    pub fn health(&self) -> HealthReport {
        let mut providers = BTreeMap::new();
        let mut any_open = false;

        for entry in &self.providers {
            let name = entry.adapter.name();
            let state = self.breaker(name).state();
            let status = if state == CircuitState::Open {
                any_open = true;
                "circuit open"
            } else {
                "configured"
            };

            providers.insert(
                name.to_string(),
                ProviderHealth {
                    status: status.to_string(),
                    configured: true,
                    circuit: Some(state.to_string()),
                },
            );
        }

        for name in &self.unconfigured {
            providers.insert(
                name.clone(),
                ProviderHealth {
                    status: "not configured".to_string(),
                    configured: false,
                    circuit: None,
                },
            );
        }

        let status = if self.providers.is_empty() {
            HealthStatus::Unconfigured
        } else if any_open {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            providers,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Get circuit breaker stats for all providers
    pub fn circuit_breaker_stats(&self) -> Vec<CircuitBreakerStats> {
        self.providers
            .iter()
            .map(|entry| self.breaker(entry.adapter.name()).stats())
            .collect()
    }

    /// Reset all circuit breakers
    pub fn reset_circuit_breakers(&self) {
        for entry in self.circuit_breakers.iter() {
            entry.value().reset();
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for assembling a service from adapters (tests, embedding)
pub struct AiServiceBuilder {
    providers: Vec<ChainedAdapter>,
    unconfigured: Vec<String>,
    breaker_config: CircuitBreakerConfig,
    retry_policy: RetryPolicy,
    timeout: Duration,
    system_prompt: String,
    max_message_chars: usize,
}

impl AiServiceBuilder {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            unconfigured: Vec::new(),
            breaker_config: CircuitBreakerConfig::default(),
            retry_policy: RetryPolicy::default(),
            timeout: Duration::from_secs(network::DEFAULT_TIMEOUT_SECS),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_message_chars: validation::MAX_MESSAGE_CHARS,
        }
    }

    /// Append a provider with default generation settings
    pub fn add_adapter(self, adapter: SharedAdapter) -> Self {
        self.add_adapter_with_defaults(
            adapter,
            generation::DEFAULT_TEMPERATURE,
            generation::DEFAULT_MAX_TOKENS,
        )
    }

    pub fn add_adapter_with_defaults(
        mut self,
        adapter: SharedAdapter,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        self.providers.push(ChainedAdapter {
            adapter,
            temperature,
            max_tokens,
        });
        self
    }

    /// Record a known provider that has no credential
    pub fn add_unconfigured(mut self, name: impl Into<String>) -> Self {
        self.unconfigured.push(name.into());
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    /// Per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_message_chars(mut self, max: usize) -> Self {
        self.max_message_chars = max;
        self
    }

    pub fn build(self) -> AiService {
        let circuit_breakers = DashMap::new();
        for entry in &self.providers {
            let name = entry.adapter.name();
            circuit_breakers.insert(
                name.to_string(),
                Arc::new(CircuitBreaker::new(name, self.breaker_config.clone())),
            );
        }

        AiService {
            providers: self.providers,
            unconfigured: self.unconfigured,
            circuit_breakers: Arc::new(circuit_breakers),
            breaker_config: self.breaker_config,
            retry: RetryManager::new(self.retry_policy),
            timeout: self.timeout,
            system_prompt: self.system_prompt,
            max_message_chars: self.max_message_chars,
        }
    }
}

impl Default for AiServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::classifier::RawFailure;
    use crate::ai::provider::ProviderAdapter;
    use crate::config::Profile;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Adapter replaying scripted outcomes; the last one repeats
    struct MockAdapter {
        name: String,
        script: Mutex<Vec<std::result::Result<Generation, RawFailure>>>,
        delay: Option<Duration>,
        calls: Arc<AtomicU32>,
        last_request: Mutex<Option<GenerationRequest>>,
    }

    impl MockAdapter {
        fn scripted(name: &str, script: Vec<std::result::Result<Generation, RawFailure>>) -> Self {
            Self {
                name: name.to_string(),
                script: Mutex::new(script),
                delay: None,
                calls: Arc::new(AtomicU32::new(0)),
                last_request: Mutex::new(None),
            }
        }

        fn replying(name: &str, text: &str) -> Self {
            Self::scripted(name, vec![Ok(generation(name, text))])
        }

        fn failing(name: &str, failure: RawFailure) -> Self {
            Self::scripted(name, vec![Err(failure)])
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn calls(&self) -> Arc<AtomicU32> {
            Arc::clone(&self.calls)
        }
    }

    #[async_trait]
    impl ProviderAdapter for MockAdapter {
        fn name(&self) -> &str {
            &self.name
        }

        fn model(&self) -> &str {
            "mock-model"
        }

        async fn call(
            &self,
            request: &GenerationRequest,
        ) -> std::result::Result<Generation, RawFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            }
        }
    }

    fn generation(provider: &str, text: &str) -> Generation {
        Generation {
            text: text.to_string(),
            model: format!("{}-model", provider),
            usage: None,
        }
    }

    fn http(status: u16) -> RawFailure {
        RawFailure::Http {
            status,
            retry_after: None,
            message: format!("HTTP {}", status),
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    fn service(adapters: Vec<Arc<MockAdapter>>, max_attempts: u32) -> AiService {
        adapters
            .into_iter()
            .fold(AiService::builder(), |builder, adapter| {
                builder.add_adapter(adapter as SharedAdapter)
            })
            .with_retry_policy(fast_retry(max_attempts))
            .with_timeout(Duration::from_secs(1))
            .build()
    }

    async fn ask(service: &AiService, message: &str) -> ResponseEnvelope {
        service
            .generate_response(message, None, None, &CancellationToken::new())
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_success() {
        let gemini = Arc::new(MockAdapter::replying("gemini", "Hi there"));
        let groq = Arc::new(MockAdapter::replying("groq", "unused"));
        let groq_calls = groq.calls();
        let svc = service(vec![gemini, groq], 4);

        match ask(&svc, "Hello").await {
            ResponseEnvelope::Success(ok) => {
                assert!(ok.success);
                assert_eq!(ok.response, "Hi there");
                assert_eq!(ok.provider, "gemini");
                assert!(ok.correlation_id.as_str().starts_with("ai_"));
            }
            other => panic!("expected success, got {:?}", other),
        }
        assert_eq!(groq_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_fall_back_to_next_provider() {
        let gemini = Arc::new(MockAdapter::failing("gemini", http(503)));
        let groq = Arc::new(MockAdapter::replying("groq", "from groq"));
        let (gemini_calls, groq_calls) = (gemini.calls(), groq.calls());
        let svc = service(vec![gemini, groq], 4);

        match ask(&svc, "Hello").await {
            ResponseEnvelope::Success(ok) => assert_eq!(ok.provider, "groq"),
            other => panic!("expected success, got {:?}", other),
        }
        assert_eq!(gemini_calls.load(Ordering::SeqCst), 4);
        assert_eq!(groq_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_recovers_on_same_provider() {
        let gemini = Arc::new(MockAdapter::scripted(
            "gemini",
            vec![
                Err(RawFailure::Connect("reset".into())),
                Ok(generation("gemini", "second try")),
            ],
        ));
        let calls = gemini.calls();
        let svc = service(vec![gemini], 4);

        assert!(ask(&svc, "Hello").await.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_request_stops_fallback() {
        let gemini = Arc::new(MockAdapter::failing("gemini", http(400)));
        let groq = Arc::new(MockAdapter::replying("groq", "unused"));
        let (gemini_calls, groq_calls) = (gemini.calls(), groq.calls());
        let svc = service(vec![gemini, groq], 4);

        let envelope = ask(&svc, "Hello").await;
        assert_eq!(envelope.error_kind(), Some(ErrorKind::BadRequest));
        assert_eq!(gemini_calls.load(Ordering::SeqCst), 1);
        assert_eq!(groq_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_falls_through_and_last_kind_wins() {
        let gemini = Arc::new(MockAdapter::failing("gemini", http(401)));
        let groq = Arc::new(MockAdapter::failing("groq", http(500)));
        let (gemini_calls, groq_calls) = (gemini.calls(), groq.calls());
        let svc = service(vec![gemini, groq], 3);

        let envelope = ask(&svc, "Hello").await;
        match &envelope {
            ResponseEnvelope::Failure(failure) => {
                assert_eq!(failure.kind, ErrorKind::Server);
                assert_eq!(failure.error, ErrorKind::Server.user_message());
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(gemini_calls.load(Ordering::SeqCst), 1);
        assert_eq!(groq_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_messages_touch_no_provider() {
        let gemini = Arc::new(MockAdapter::replying("gemini", "unused"));
        let calls = gemini.calls();
        let svc = service(vec![gemini], 4);

        let too_long = "x".repeat(4001);
        for message in ["", "   \n\t", too_long.as_str()] {
            let envelope = ask(&svc, message).await;
            assert_eq!(envelope.error_kind(), Some(ErrorKind::BadRequest));
        }
        assert!(ask(&svc, &"x".repeat(4000)).await.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_providers_is_configuration_error() {
        let svc = AiService::builder().add_unconfigured("gemini").build();
        let envelope = ask(&svc, "Hello").await;
        assert_eq!(envelope.error_kind(), Some(ErrorKind::Configuration));

        let health = svc.health();
        assert_eq!(health.status, HealthStatus::Unconfigured);
        assert_eq!(health.providers["gemini"].status, "not configured");
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_skips_provider() {
        let gemini = Arc::new(MockAdapter::failing("gemini", http(503)));
        let groq = Arc::new(MockAdapter::replying("groq", "from groq"));
        let (gemini_calls, groq_calls) = (gemini.calls(), groq.calls());
        let svc = AiService::builder()
            .add_adapter(gemini)
            .add_adapter(groq)
            .with_retry_policy(fast_retry(2))
            .with_circuit_breaker(CircuitBreakerConfig {
                enabled: true,
                failure_threshold: 1,
                reset_timeout: Duration::from_secs(30),
            })
            .build();

        assert!(ask(&svc, "first").await.is_success());
        assert_eq!(gemini_calls.load(Ordering::SeqCst), 2);

        let health = svc.health();
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.providers["gemini"].status, "circuit open");
        assert_eq!(health.providers["gemini"].circuit.as_deref(), Some("OPEN"));

        match ask(&svc, "second").await {
            ResponseEnvelope::Success(ok) => assert_eq!(ok.provider, "groq"),
            other => panic!("expected success, got {:?}", other),
        }
        assert_eq!(gemini_calls.load(Ordering::SeqCst), 2);
        assert_eq!(groq_calls.load(Ordering::SeqCst), 2);

        svc.reset_circuit_breakers();
        assert_eq!(svc.health().status, HealthStatus::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_request_stops_without_fallback() {
        let gemini = Arc::new(MockAdapter::replying("gemini", "slow").with_delay(Duration::from_millis(500)));
        let groq = Arc::new(MockAdapter::replying("groq", "unused"));
        let groq_calls = groq.calls();
        let svc = service(vec![gemini, groq], 4);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let envelope = svc.generate_response("Hello", None, None, &cancel).await;
        assert_eq!(envelope.error_kind(), Some(ErrorKind::Cancelled));
        assert_eq!(groq_calls.load(Ordering::SeqCst), 0);
        assert_eq!(svc.health().status, HealthStatus::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_retried_then_reported() {
        let gemini = Arc::new(MockAdapter::replying("gemini", "late").with_delay(Duration::from_secs(5)));
        let calls = gemini.calls();
        let svc = service(vec![gemini], 2);

        let envelope = ask(&svc, "Hello").await;
        assert_eq!(envelope.error_kind(), Some(ErrorKind::Timeout));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supplied_correlation_id_is_echoed() {
        let svc = service(vec![Arc::new(MockAdapter::failing("gemini", http(401)))], 1);
        let id = CorrelationId::new("client-req-9");
        let envelope = svc
            .generate_response("Hello", None, Some(id.clone()), &CancellationToken::new())
            .await;
        assert_eq!(envelope.correlation_id(), &id);
        assert_eq!(envelope.error_kind(), Some(ErrorKind::ApiKey));
    }

    #[tokio::test(start_paused = true)]
    async fn test_options_are_clamped() {
        let gemini = Arc::new(MockAdapter::replying("gemini", "ok"));
        let svc = service(vec![Arc::clone(&gemini)], 1);

        let options = RequestOptions {
            temperature: Some(5.0),
            max_tokens: Some(0),
        };
        svc.generate_response("  Hello  ", Some(options), None, &CancellationToken::new())
            .await;

        let request = gemini.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.message, "Hello");
        assert_eq!(request.temperature, 2.0);
        assert_eq!(request.max_tokens, 1);
    }

    #[test]
    fn test_from_config_uses_configured_keys() {
        let mut config = Config::for_profile(Profile::Test);
        config.providers.gemini.api_key = Some("AIza-test".into());
        config.providers.groq.api_key = Some("gsk-test".into());

        let svc = AiService::from_config(&config).unwrap();
        assert_eq!(svc.provider_names(), vec!["gemini", "groq"]);
        assert_eq!(svc.health().status, HealthStatus::Healthy);
        assert!(!format!("{:?}", svc).contains("AIza-test"));
    }

    #[test]
    fn test_from_config_disabled_providers_are_unconfigured() {
        let mut config = Config::for_profile(Profile::Test);
        config.providers.gemini.enabled = false;
        config.providers.groq.enabled = false;
        config.providers.groq.api_key = Some("gsk-test".into());

        let svc = AiService::from_config(&config).unwrap();
        assert!(!svc.has_providers());
        let health = svc.health();
        assert_eq!(health.status, HealthStatus::Unconfigured);
        assert!(!health.providers["groq"].configured);
    }
}
