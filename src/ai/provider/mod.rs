//! LLM Provider Abstraction
//!
//! Defines the `ProviderAdapter` trait: one adapter per upstream API, each
//! translating a [`GenerationRequest`] into that vendor's wire format and
//! the reply back into a [`Generation`].
//!
//! Adapters perform exactly one HTTP exchange per `call`. They never retry
//! and never swallow errors; every failure comes back as a [`RawFailure`]
//! for the classifier.
//!
//! ## Modules
//!
//! - `gemini`: Google Generative Language API
//! - `groq`: Groq OpenAI-compatible chat completions
//! - `prompt`: Default system prompt and prompt assembly

pub mod gemini;
pub mod groq;
pub mod prompt;

pub use gemini::GeminiAdapter;
pub use groq::GroqAdapter;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::Value;

use super::classifier::{RawFailure, parse_retry_after};
use crate::constants::network;
use crate::types::{RelayError, Result};

// =============================================================================
// Request / Response
// =============================================================================

/// Everything an adapter needs for one generation
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub message: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Successful generation
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    /// Model identifier as reported to callers
    pub model: String,
    /// Vendor usage block, passed through untouched
    pub usage: Option<Value>,
}

// =============================================================================
// Provider Descriptor
// =============================================================================

/// Static description of one provider.
///
/// Built only while constructing the orchestration service. The credential
/// is never serialized and is redacted in debug output.
#[derive(Clone)]
pub struct ProviderDescriptor {
    pub name: String,
    pub credential: SecretString,
    pub base_url: String,
    pub model: String,
    /// Transport-level timeout for one request
    pub timeout: Duration,
}

impl std::fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("name", &self.name)
            .field("credential", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderDescriptor {
    pub fn new(
        name: impl Into<String>,
        credential: SecretString,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            credential,
            base_url: base_url.into(),
            model: model.into(),
            timeout: Duration::from_secs(network::DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base URL without a trailing slash
    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

// =============================================================================
// Provider Adapter Trait
// =============================================================================

/// One upstream LLM API
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name for logging and routing ("gemini", "groq")
    fn name(&self) -> &str;

    /// Model identifier as reported to callers
    fn model(&self) -> &str;

    /// Perform one generation request
    async fn call(&self, request: &GenerationRequest) -> std::result::Result<Generation, RawFailure>;
}

/// Shared adapter type held by the orchestration service
pub type SharedAdapter = Arc<dyn ProviderAdapter>;

/// Create an adapter for a known provider name
pub fn create_adapter(descriptor: ProviderDescriptor) -> Result<SharedAdapter> {
    match descriptor.name.as_str() {
        "gemini" => Ok(Arc::new(GeminiAdapter::new(descriptor)?)),
        "groq" => Ok(Arc::new(GroqAdapter::new(descriptor)?)),
        other => Err(RelayError::Config(format!(
            "Unknown provider: {}. Supported: gemini, groq",
            other
        ))),
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(RelayError::Http)
}

// =============================================================================
// Shared Wire Helpers
// =============================================================================

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// Turn a non-2xx response into `RawFailure::Http`.
///
/// The message is the vendor's `error.message` when the body carries one,
/// else `HTTP <status>`.
async fn failure_from_response(response: reqwest::Response) -> RawFailure {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_retry_after);
    let body = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|parsed| parsed.error)
        .and_then(|detail| detail.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status));

    RawFailure::Http {
        status,
        retry_after,
        message,
    }
}

/// Decode a 2xx body. An empty body decodes as `{}`.
async fn decode_success<T>(response: reqwest::Response, provider: &str) -> std::result::Result<T, RawFailure>
where
    T: for<'de> Deserialize<'de>,
{
    let body = response
        .text()
        .await
        .map_err(|e| RawFailure::from_reqwest(&e))?;
    let body = if body.trim().is_empty() { "{}" } else { body.as_str() };

    serde_json::from_str(body)
        .map_err(|e| RawFailure::Parse(format!("Invalid JSON response from {}: {}", provider, e)))
}
