//! Configuration Types
//!
//! All configuration structures with per-profile defaults.
//! Supports global (~/.config/ai-relay/) and project (.ai-relay/) level configuration.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ai::circuit_breaker::CircuitBreakerConfig;
use crate::ai::provider::prompt::DEFAULT_SYSTEM_PROMPT;
use crate::ai::provider::{gemini, groq};
use crate::ai::retry::RetryPolicy;
use crate::constants::{circuit_breaker, generation, network, rate_limit, retry, validation};
use crate::types::{RelayError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Deployment profile the defaults were taken from
    pub profile: Profile,

    /// HTTP endpoint settings
    pub server: ServerConfig,

    /// Backoff policy for provider calls
    pub retry: RetrySettings,

    /// Per-provider circuit breaker settings
    pub circuit_breaker: CircuitBreakerSettings,

    /// Endpoint rate limiting
    pub rate_limit: RateLimitSettings,

    /// Input validation limits
    pub validation: ValidationSettings,

    /// Upstream LLM providers
    pub providers: ProvidersConfig,

    /// Prompt settings
    pub prompt: PromptConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::for_profile(Profile::default())
    }
}

impl Config {
    /// Built-in defaults for a deployment profile
    pub fn for_profile(profile: Profile) -> Self {
        let (timeout_secs, retry, circuit_breaker) = match profile {
            Profile::Development => (
                30,
                RetrySettings {
                    max_attempts: retry::DEFAULT_MAX_ATTEMPTS,
                    base_delay_ms: retry::BASE_DELAY_MS,
                    max_delay_ms: retry::MAX_DELAY_MS,
                    ..Default::default()
                },
                CircuitBreakerSettings {
                    enabled: true,
                    failure_threshold: 5,
                    reset_timeout_secs: 60,
                },
            ),
            Profile::Production => (
                network::DEFAULT_TIMEOUT_SECS,
                RetrySettings::default(),
                CircuitBreakerSettings::default(),
            ),
            Profile::Test => (
                5,
                RetrySettings {
                    max_attempts: 2,
                    base_delay_ms: 100,
                    max_delay_ms: 1000,
                    ..Default::default()
                },
                CircuitBreakerSettings {
                    enabled: false,
                    failure_threshold: 10,
                    reset_timeout_secs: 10,
                },
            ),
        };

        Self {
            version: "1.0".to_string(),
            profile,
            server: ServerConfig::default(),
            retry,
            circuit_breaker,
            rate_limit: RateLimitSettings::default(),
            validation: ValidationSettings::default(),
            providers: ProvidersConfig {
                timeout_secs,
                ..Default::default()
            },
            prompt: PromptConfig::default(),
        }
    }

    /// Validate configuration values are within acceptable ranges.
    /// Returns `RelayError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        self.server
            .bind
            .parse::<SocketAddr>()
            .map_err(|e| RelayError::Config(format!("Invalid server bind address: {}", e)))?;

        self.retry.to_policy().validate()?;

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(RelayError::Config(
                "circuit_breaker failure_threshold must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit.requests_per_minute == 0 || self.rate_limit.burst == 0 {
            return Err(RelayError::Config(
                "rate_limit requests_per_minute and burst must be greater than 0".to_string(),
            ));
        }

        if self.validation.max_message_chars == 0 {
            return Err(RelayError::Config(
                "validation max_message_chars must be greater than 0".to_string(),
            ));
        }

        if self.providers.timeout_secs == 0 {
            return Err(RelayError::Config(
                "providers timeout_secs must be greater than 0".to_string(),
            ));
        }

        for (index, name) in self.providers.priority.iter().enumerate() {
            let settings = self.providers.settings(name).ok_or_else(|| {
                RelayError::Config(format!(
                    "Unknown provider in priority list: {}. Supported: gemini, groq",
                    name
                ))
            })?;

            if self.providers.priority[..index].contains(name) {
                return Err(RelayError::Config(format!(
                    "Provider listed twice in priority: {}",
                    name
                )));
            }

            settings.validate(name)?;
        }

        Ok(())
    }
}

// =============================================================================
// Profile
// =============================================================================

/// Deployment profile selecting built-in defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Development,
    Production,
    Test,
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Profile::Development => write!(f, "development"),
            Profile::Production => write!(f, "production"),
            Profile::Test => write!(f, "test"),
        }
    }
}

impl std::str::FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Profile::Development),
            "production" | "prod" => Ok(Profile::Production),
            "test" => Ok(Profile::Test),
            _ => Err(format!(
                "Unknown profile: {}. Valid values: development, production, test",
                s
            )),
        }
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind: String,

    /// Maximum accepted request body in bytes
    pub request_body_limit: usize,

    /// Key rate limiting on the first `X-Forwarded-For` hop instead of the
    /// peer address. Only safe behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: network::DEFAULT_BIND.to_string(),
            request_body_limit: network::REQUEST_BODY_LIMIT,
            trust_forwarded_for: false,
        }
    }
}

// =============================================================================
// Resilience Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per provider, including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: retry::DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: retry::BASE_DELAY_MS,
            max_delay_ms: retry::MAX_DELAY_MS,
            backoff_multiplier: retry::BACKOFF_MULTIPLIER,
            jitter: true,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter: self.jitter,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub enabled: bool,
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Cooldown before a trial request is allowed
    pub reset_timeout_secs: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: circuit_breaker::FAILURE_THRESHOLD,
            reset_timeout_secs: circuit_breaker::RESET_TIMEOUT_SECS,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn to_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            enabled: self.enabled,
            failure_threshold: self.failure_threshold,
            reset_timeout: Duration::from_secs(self.reset_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub requests_per_minute: u32,
    pub burst: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: rate_limit::REQUESTS_PER_MINUTE,
            burst: rate_limit::BURST_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Maximum message length in characters (after trimming)
    pub max_message_chars: usize,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            max_message_chars: validation::MAX_MESSAGE_CHARS,
        }
    }
}

// =============================================================================
// Provider Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Per-attempt timeout in seconds
    pub timeout_secs: u64,

    /// Fallback order, first entry is tried first
    pub priority: Vec<String>,

    pub gemini: ProviderSettings,

    pub groq: ProviderSettings,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            timeout_secs: network::DEFAULT_TIMEOUT_SECS,
            priority: vec!["gemini".to_string(), "groq".to_string()],
            gemini: ProviderSettings::new(gemini::DEFAULT_API_BASE, gemini::DEFAULT_MODEL),
            groq: ProviderSettings::new(groq::DEFAULT_API_BASE, groq::DEFAULT_MODEL),
        }
    }
}

impl ProvidersConfig {
    pub fn settings(&self, name: &str) -> Option<&ProviderSettings> {
        match name {
            "gemini" => Some(&self.gemini),
            "groq" => Some(&self.groq),
            _ => None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Settings for one provider
///
/// Note: API keys are never serialized to output and are redacted in debug
/// output. When unset, the `<NAME>_API_KEY` environment variable is used.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub enabled: bool,

    /// Never serialized to output for security
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    pub api_base: String,

    pub model: String,

    /// Default sampling temperature (0.0 - 2.0)
    pub temperature: f32,

    /// Default generation limit
    pub max_tokens: u32,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("enabled", &self.enabled)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl ProviderSettings {
    fn new(api_base: &str, model: &str) -> Self {
        Self {
            enabled: true,
            api_key: None,
            api_base: api_base.to_string(),
            model: model.to_string(),
            temperature: generation::DEFAULT_TEMPERATURE,
            max_tokens: generation::DEFAULT_MAX_TOKENS,
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !(0.0..=generation::MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(RelayError::Config(format!(
                "{} temperature must be between 0.0 and {}, got {}",
                name,
                generation::MAX_TEMPERATURE,
                self.temperature
            )));
        }

        if self.max_tokens == 0 || self.max_tokens > generation::MAX_TOKENS_CEILING {
            return Err(RelayError::Config(format!(
                "{} max_tokens must be between 1 and {}, got {}",
                name,
                generation::MAX_TOKENS_CEILING,
                self.max_tokens
            )));
        }

        url::Url::parse(&self.api_base)
            .map_err(|e| RelayError::Config(format!("{} api_base is not a URL: {}", name, e)))?;

        if self.model.trim().is_empty() {
            return Err(RelayError::Config(format!("{} model must not be empty", name)));
        }

        Ok(())
    }
}

// =============================================================================
// Prompt Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub system_prompt: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}
