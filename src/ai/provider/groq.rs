//! Groq Provider
//!
//! Groq exposes an OpenAI-compatible Chat Completions API. The reported
//! model is prefixed with `groq:` so callers can tell the backends apart.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{
    Generation, GenerationRequest, ProviderAdapter, ProviderDescriptor, build_client,
    decode_success, failure_from_response,
};
use crate::ai::classifier::RawFailure;
use crate::constants::generation::EMPTY_GENERATION_TEXT;
use crate::types::Result;

pub const DEFAULT_API_BASE: &str = "https://api.groq.com";
pub const DEFAULT_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

/// Groq adapter with secure API key handling
pub struct GroqAdapter {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    endpoint: String,
    model: String,
    reported_model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GroqAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqAdapter")
            .field("api_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

impl GroqAdapter {
    pub fn new(descriptor: ProviderDescriptor) -> Result<Self> {
        let client = build_client(descriptor.timeout)?;
        let endpoint = format!("{}/openai/v1/chat/completions", descriptor.base());

        Ok(Self {
            api_key: descriptor.credential,
            endpoint,
            reported_model: format!("groq:{}", descriptor.model),
            model: descriptor.model,
            client,
        })
    }

    fn build_request(&self, request: &GenerationRequest) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.message.clone(),
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: 1.0,
            stream: false,
        }
    }
}

#[async_trait]
impl ProviderAdapter for GroqAdapter {
    fn name(&self) -> &str {
        "groq"
    }

    fn model(&self) -> &str {
        &self.reported_model
    }

    async fn call(&self, request: &GenerationRequest) -> std::result::Result<Generation, RawFailure> {
        debug!(model = %self.model, "Sending request to Groq API");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.build_request(request))
            .send()
            .await
            .map_err(|e| RawFailure::from_reqwest(&e))?;

        if !response.status().is_success() {
            return Err(failure_from_response(response).await);
        }

        let body: ChatCompletionResponse = decode_success(response, "Groq API").await?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| EMPTY_GENERATION_TEXT.to_string());

        Ok(Generation {
            text,
            model: self.reported_model.clone(),
            usage: body.usage,
        })
    }
}

// =============================================================================
// Chat Completions API Types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const COMPLETIONS_PATH: &str = "/openai/v1/chat/completions";

    fn adapter(server: &MockServer) -> GroqAdapter {
        GroqAdapter::new(ProviderDescriptor::new(
            "groq",
            SecretString::from("gsk-test"),
            server.uri(),
            DEFAULT_MODEL,
        ))
        .unwrap()
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            message: "Hello".to_string(),
            system_prompt: "Be brief.".to_string(),
            temperature: 0.5,
            max_tokens: 256,
        }
    }

    #[tokio::test]
    async fn test_call_success_and_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(COMPLETIONS_PATH))
            .and(header("authorization", "Bearer gsk-test"))
            .and(body_partial_json(json!({
                "model": DEFAULT_MODEL,
                "messages": [
                    { "role": "system", "content": "Be brief." },
                    { "role": "user", "content": "Hello" }
                ],
                "max_tokens": 256,
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "Hey!" } }],
                "usage": { "total_tokens": 9 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let generation = adapter(&server).call(&request()).await.unwrap();
        assert_eq!(generation.text, "Hey!");
        assert_eq!(
            generation.model,
            "groq:meta-llama/llama-4-scout-17b-16e-instruct"
        );
        assert_eq!(generation.usage, Some(json!({ "total_tokens": 9 })));
    }

    #[tokio::test]
    async fn test_null_content_yields_placeholder() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(COMPLETIONS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": null } }]
            })))
            .mount(&server)
            .await;

        let generation = adapter(&server).call(&request()).await.unwrap();
        assert_eq!(generation.text, EMPTY_GENERATION_TEXT);
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(COMPLETIONS_PATH))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({ "error": { "message": "Invalid API Key" } })),
            )
            .mount(&server)
            .await;

        let failure = adapter(&server).call(&request()).await.unwrap_err();
        assert_eq!(
            failure,
            RawFailure::Http {
                status: 401,
                retry_after: None,
                message: "Invalid API Key".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_connect_failure() {
        let adapter = GroqAdapter::new(ProviderDescriptor::new(
            "groq",
            SecretString::from("gsk-test"),
            "http://127.0.0.1:9",
            DEFAULT_MODEL,
        ))
        .unwrap();

        let failure = adapter.call(&request()).await.unwrap_err();
        assert!(matches!(failure, RawFailure::Connect(_)), "{:?}", failure);
    }
}
