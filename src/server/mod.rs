//! HTTP endpoint
//!
//! Serves the relay over axum with graceful shutdown. In-flight generations
//! are cancelled through the state's shutdown token when the server stops.

pub mod handlers;
pub mod routes;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::types::{RelayError, Result};

pub use routes::create_router;
pub use state::AppState;

/// Interval between sweeps of idle rate-limit buckets
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// The relay HTTP server
pub struct RelayServer {
    state: Arc<AppState>,
    addr: SocketAddr,
}

impl RelayServer {
    pub fn new(state: AppState, addr: SocketAddr) -> Self {
        Self {
            state: Arc::new(state),
            addr,
        }
    }

    /// Parse `bind` and build a server for it
    pub fn bind(state: AppState, bind: &str) -> Result<Self> {
        let addr: SocketAddr = bind
            .parse()
            .map_err(|e| RelayError::Config(format!("Invalid bind address {}: {}", bind, e)))?;
        Ok(Self::new(state, addr))
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Run until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(&self.addr)
            .await
            .map_err(|e| RelayError::Server(format!("Failed to bind to {}: {}", self.addr, e)))?;

        let local_addr = listener.local_addr().unwrap_or(self.addr);
        tracing::info!(
            addr = %local_addr,
            providers = ?self.state.service.provider_names(),
            rate_limited = self.state.rate_limiter.is_some(),
            "Relay server starting"
        );

        let prune_handle = spawn_prune_task(self.state.clone());
        let token = self.state.shutdown.clone();
        let router = create_router(self.state.clone());

        let result = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            // Abort in-flight generations so connections can drain
            token.cancel();
        })
        .await
        .map_err(|e| RelayError::Server(format!("Server error: {}", e)));

        self.state.shutdown.cancel();
        if let Some(handle) = prune_handle {
            let _ = handle.await;
        }

        tracing::info!("Relay server stopped");
        result
    }
}

fn spawn_prune_task(state: Arc<AppState>) -> Option<tokio::task::JoinHandle<()>> {
    state.rate_limiter.as_ref()?;
    let token: CancellationToken = state.shutdown.clone();

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    if let Some(limiter) = &state.rate_limiter {
                        limiter.prune();
                        tracing::trace!(clients = limiter.tracked_keys(), "Pruned rate-limit buckets");
                    }
                }
            }
        }
    }))
}

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        () = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
