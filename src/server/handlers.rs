//! HTTP request handlers for the relay endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::ai::RequestEnvelope;
use crate::constants::network::CORRELATION_ID_HEADER;
use crate::types::CorrelationId;

use super::state::AppState;

const ANONYMOUS_CLIENT: &str = "anonymous";

/// POST /api/ai
///
/// Logical failures (provider errors, validation) are 200 with a failure
/// envelope. Only a malformed body (400) or rate limiting (429) change the
/// status.
pub async fn generate(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(CorrelationId::parse)
        .unwrap_or_else(CorrelationId::generate);

    if let Some(limiter) = &state.rate_limiter {
        let key = client_key(&request, state.trust_forwarded_for);
        if let Err(wait) = limiter.check(&key) {
            tracing::warn!(
                correlation_id = %correlation_id,
                client = %key,
                wait_ms = wait.as_millis() as u64,
                "Rate limit exceeded"
            );
            return with_correlation_id(rate_limited(wait), &correlation_id);
        }
    }

    let body = match axum::body::to_bytes(request.into_body(), state.request_body_limit).await {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!(correlation_id = %correlation_id, error = %e, "Unreadable request body");
            return with_correlation_id(bad_request("Request body is too large or unreadable"), &correlation_id);
        }
    };

    let envelope: RequestEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(correlation_id = %correlation_id, error = %e, "Malformed request body");
            return with_correlation_id(
                bad_request("Request body must be JSON with a \"message\" string"),
                &correlation_id,
            );
        }
    };

    let cancel = state.shutdown.child_token();
    let response = state
        .service
        .generate_response(
            &envelope.message,
            envelope.options,
            Some(correlation_id.clone()),
            &cancel,
        )
        .await;

    with_correlation_id((StatusCode::OK, Json(response)).into_response(), &correlation_id)
}

/// GET /api/ai
///
/// Provider configuration and circuit overview.
pub async fn health_report(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.service.health()))
}

/// OPTIONS requests are answered by the CORS layer before routing; report
/// them as 204 instead of an empty 200
pub async fn preflight_no_content(request: Request, next: Next) -> Response {
    let is_options = request.method() == Method::OPTIONS;
    let mut response = next.run(request).await;
    if is_options && response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

/// GET /api/health
pub async fn liveness() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "message": "Health check passed",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}

/// Rate-limit key: the peer address, or the first `X-Forwarded-For` hop when
/// the deployment trusts its proxy
fn client_key(request: &Request, trust_forwarded_for: bool) -> String {
    let forwarded = trust_forwarded_for
        .then(|| forwarded_for(request.headers()))
        .flatten();

    forwarded
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| ANONYMOUS_CLIENT.to_string())
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .map(str::to_string)
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn rate_limited(wait: Duration) -> Response {
    // Whole seconds, never zero
    let retry_after = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    let retry_after = retry_after.max(1);

    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "Too many requests. Please wait a moment and try again.",
            "retryAfter": retry_after,
        })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

fn with_correlation_id(mut response: Response, correlation_id: &CorrelationId) -> Response {
    if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}
