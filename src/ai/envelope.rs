//! Request and Response Envelopes
//!
//! Wire shapes shared by the HTTP endpoint, the client session and the CLI.
//! A response is exactly one of the success or failure shapes, told apart
//! by the `success` flag.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ClassifiedError, CorrelationId, ErrorKind};

// =============================================================================
// Request
// =============================================================================

/// Incoming chat request. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<RequestOptions>,
}

impl RequestEnvelope {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            options: None,
        }
    }
}

/// Per-request generation overrides
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "max_tokens")]
    pub max_tokens: Option<u32>,
}

// =============================================================================
// Response
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessEnvelope {
    pub success: bool,
    pub response: String,
    pub model: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureEnvelope {
    pub success: bool,
    /// User-safe message; technical detail stays in logs
    pub error: String,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub correlation_id: CorrelationId,
}

/// Outcome of one orchestration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseEnvelope {
    Success(SuccessEnvelope),
    Failure(FailureEnvelope),
}

impl ResponseEnvelope {
    pub fn success(
        response: impl Into<String>,
        model: impl Into<String>,
        provider: impl Into<String>,
        usage: Option<Value>,
        correlation_id: CorrelationId,
    ) -> Self {
        Self::Success(SuccessEnvelope {
            success: true,
            response: response.into(),
            model: model.into(),
            provider: provider.into(),
            usage,
            correlation_id,
        })
    }

    /// Failure envelope carrying only the user-safe message for the kind
    pub fn failure(kind: ErrorKind, correlation_id: CorrelationId) -> Self {
        Self::Failure(FailureEnvelope {
            success: false,
            error: kind.user_message().to_string(),
            kind,
            correlation_id,
        })
    }

    pub fn from_error(error: &ClassifiedError) -> Self {
        Self::failure(error.kind, error.correlation_id.clone())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        match self {
            Self::Success(s) => &s.correlation_id,
            Self::Failure(f) => &f.correlation_id,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success(_) => None,
            Self::Failure(f) => Some(f.kind),
        }
    }
}

// =============================================================================
// Health
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unconfigured,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unconfigured => write!(f, "unconfigured"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    /// "configured", "not configured" or "circuit open"
    pub status: String,
    pub configured: bool,
    /// Breaker state (`CLOSED`, `OPEN`, `HALF_OPEN`), absent when unconfigured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit: Option<String>,
}

/// Configuration and circuit overview. Never contains credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub providers: BTreeMap<String, ProviderHealth>,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id() -> CorrelationId {
        CorrelationId::new("ai_1_abc")
    }

    #[test]
    fn test_success_wire_shape() {
        let envelope = ResponseEnvelope::success("Hi", "gemini-1.5-flash", "gemini", None, id());
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "success": true,
                "response": "Hi",
                "model": "gemini-1.5-flash",
                "provider": "gemini",
                "correlationId": "ai_1_abc"
            })
        );
    }

    #[test]
    fn test_failure_wire_shape() {
        let envelope = ResponseEnvelope::failure(ErrorKind::RateLimit, id());
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "success": false,
                "error": "AI service is busy. Please wait a moment and try again.",
                "type": "RATE_LIMIT",
                "correlationId": "ai_1_abc"
            })
        );
        assert_eq!(envelope.error_kind(), Some(ErrorKind::RateLimit));
    }

    #[test]
    fn test_from_error_drops_technical_detail() {
        let error = ClassifiedError::new(ErrorKind::Server, "upstream 503 at 10.0.0.7", id());
        let json = serde_json::to_string(&ResponseEnvelope::from_error(&error)).unwrap();
        assert!(!json.contains("10.0.0.7"));
        assert!(json.contains("\"SERVER\""));
    }

    #[test]
    fn test_envelope_deserializes_both_shapes() {
        let ok: ResponseEnvelope = serde_json::from_value(json!({
            "success": true, "response": "x", "model": "m", "provider": "groq",
            "correlationId": "c1"
        }))
        .unwrap();
        assert!(ok.is_success());

        let failed: ResponseEnvelope = serde_json::from_value(json!({
            "success": false, "error": "busy", "type": "TIMEOUT", "correlationId": "c2"
        }))
        .unwrap();
        assert_eq!(failed.error_kind(), Some(ErrorKind::Timeout));
        assert_eq!(failed.correlation_id().as_str(), "c2");
    }

    #[test]
    fn test_request_ignores_unknown_keys() {
        let request: RequestEnvelope = serde_json::from_value(json!({
            "message": "Hello",
            "context": { "page": "/about" },
            "options": { "temperature": 0.2, "maxTokens": 100, "stream": true }
        }))
        .unwrap();
        assert_eq!(request.message, "Hello");
        let options = request.options.unwrap();
        assert_eq!(options.temperature, Some(0.2));
        assert_eq!(options.max_tokens, Some(100));
    }

    #[test]
    fn test_health_report_shape() {
        let mut providers = BTreeMap::new();
        providers.insert(
            "groq".to_string(),
            ProviderHealth {
                status: "not configured".into(),
                configured: false,
                circuit: None,
            },
        );
        let report = HealthReport {
            status: HealthStatus::Unconfigured,
            providers,
            timestamp: "2026-01-01T00:00:00Z".into(),
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "unconfigured");
        assert_eq!(value["providers"]["groq"]["status"], "not configured");
        assert!(value["providers"]["groq"].get("circuit").is_none());
    }
}
