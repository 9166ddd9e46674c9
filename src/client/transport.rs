//! Transport to a running relay endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::ai::classifier::parse_retry_after;
use crate::ai::{RawFailure, RequestEnvelope, ResponseEnvelope};
use crate::constants::network;
use crate::types::{CorrelationId, Result};

/// Delivers one request envelope to the relay
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(
        &self,
        request: &RequestEnvelope,
        correlation_id: &CorrelationId,
    ) -> std::result::Result<ResponseEnvelope, RawFailure>;
}

/// `POST {base_url}/api/ai` over reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: String,
    client: Client,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(network::CLIENT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: format!("{}/api/ai", base_url.trim_end_matches('/')),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send(
        &self,
        request: &RequestEnvelope,
        correlation_id: &CorrelationId,
    ) -> std::result::Result<ResponseEnvelope, RawFailure> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(network::CORRELATION_ID_HEADER, correlation_id.as_str())
            .json(request)
            .send()
            .await
            .map_err(|e| RawFailure::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failure_from_status(response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RawFailure::from_reqwest(&e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| RawFailure::Parse(format!("Invalid relay response: {}", e)))
    }
}

/// Map a non-2xx relay answer. 408 counts as a timeout on this side.
async fn failure_from_status(response: reqwest::Response) -> RawFailure {
    let status = response.status().as_u16();
    if status == 408 {
        return RawFailure::Timeout {
            after: Duration::ZERO,
        };
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_retry_after);

    let message = response
        .json::<Value>()
        .await
        .ok()
        .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| format!("HTTP {}", status));

    RawFailure::Http {
        status,
        retry_after,
        message,
    }
}
