//! Application state for the relay endpoint.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::ai::{AiService, RateLimiter};
use crate::config::Config;
use crate::constants::network;
use crate::types::Result;

/// Shared state handed to every handler
pub struct AppState {
    pub service: Arc<AiService>,
    /// Absent when rate limiting is disabled
    pub rate_limiter: Option<RateLimiter>,
    pub request_body_limit: usize,
    /// Key rate limiting on `X-Forwarded-For` instead of the peer address
    pub trust_forwarded_for: bool,
    /// Parent of every per-request cancellation token; cancelled on shutdown
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(service: Arc<AiService>) -> Self {
        Self {
            service,
            rate_limiter: None,
            request_body_limit: network::REQUEST_BODY_LIMIT,
            trust_forwarded_for: false,
            shutdown: CancellationToken::new(),
        }
    }

    /// State for a configured deployment
    pub fn from_config(config: &Config) -> Result<Self> {
        let service = Arc::new(AiService::from_config(config)?);
        let mut state = Self::new(service)
            .with_body_limit(config.server.request_body_limit)
            .with_trusted_forwarded_for(config.server.trust_forwarded_for);

        if config.rate_limit.enabled {
            state = state.with_rate_limiter(RateLimiter::new(
                config.rate_limit.requests_per_minute,
                config.rate_limit.burst,
            ));
        }

        Ok(state)
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.request_body_limit = limit;
        self
    }

    pub fn with_trusted_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }
}
