//! Google Gemini Provider
//!
//! Uses the Generative Language `generateContent` endpoint. Gemini has no
//! system role on this endpoint, so the system prompt is inlined ahead of the
//! user message.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::prompt::inline_prompt;
use super::{
    Generation, GenerationRequest, ProviderAdapter, ProviderDescriptor, build_client,
    decode_success, failure_from_response,
};
use crate::ai::classifier::RawFailure;
use crate::constants::generation::EMPTY_GENERATION_TEXT;
use crate::types::Result;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

const TOP_P: f32 = 0.8;
const TOP_K: u32 = 40;

/// Gemini adapter with secure API key handling
pub struct GeminiAdapter {
    /// Sent as the `key` query parameter; the full URL is never logged
    api_key: SecretString,
    endpoint: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiAdapter")
            .field("api_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiAdapter {
    pub fn new(descriptor: ProviderDescriptor) -> Result<Self> {
        let client = build_client(descriptor.timeout)?;
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            descriptor.base(),
            descriptor.model
        );

        Ok(Self {
            api_key: descriptor.credential,
            endpoint,
            model: descriptor.model,
            client,
        })
    }

    fn build_request(&self, request: &GenerationRequest) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: inline_prompt(&request.system_prompt, &request.message),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
                top_p: TOP_P,
                top_k: TOP_K,
            },
        }
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn call(&self, request: &GenerationRequest) -> std::result::Result<Generation, RawFailure> {
        debug!(model = %self.model, "Sending request to Gemini API");

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&self.build_request(request))
            .send()
            .await
            .map_err(|e| RawFailure::from_reqwest(&e.without_url()))?;

        if !response.status().is_success() {
            return Err(failure_from_response(response).await);
        }

        let body: GenerateContentResponse = decode_success(response, "Gemini API").await?;

        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts.into_iter().next())
            .and_then(|part| part.text)
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| EMPTY_GENERATION_TEXT.to_string());

        Ok(Generation {
            text,
            model: self.model.clone(),
            usage: body.usage_metadata,
        })
    }
}

// =============================================================================
// Gemini API Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}
