//! Route definitions for the relay endpoint.

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderName, Method, header},
    middleware,
    routing::get,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;
use crate::constants::network::CORRELATION_ID_HEADER;

/// Creates the Axum router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let correlation_header = HeaderName::from_static(CORRELATION_ID_HEADER);

    // CORS configuration - allow any origin for browser chat widgets
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            correlation_header.clone(),
        ])
        .expose_headers([correlation_header, header::RETRY_AFTER]);

    Router::new()
        .route(
            "/api/ai",
            get(handlers::health_report).post(handlers::generate),
        )
        .route("/api/health", get(handlers::liveness))
        .layer(cors)
        .layer(middleware::from_fn(handlers::preflight_no_content))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
