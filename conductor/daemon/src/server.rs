//! Daemon Server Implementation
//!
//! Binds the listener, serves the API router, and shuts down gracefully when
//! the shutdown future resolves.
//!
//! ```text
//!   chat client ──POST /api/chat──►  DaemonServer (axum)
//!   chat client ──POST /api/chat──►       │  one task per turn
//!                                          ▼
//!                                   RunOrchestrator
//!                                          │
//!                                    OpenAI Assistants
//! ```

use std::future::Future;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use parley_core::{ParleyConfig, RunBackend, RunOrchestrator};

use crate::api::{router, AppState};

/// Configuration for the daemon server
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listen address (`host:port`)
    pub bind: String,
    /// Characters per streamed body chunk
    pub chunk_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let settings = ParleyConfig::default().server;
        Self {
            bind: settings.bind,
            chunk_chars: settings.chunk_chars,
        }
    }
}

impl From<&ParleyConfig> for ServerConfig {
    fn from(config: &ParleyConfig) -> Self {
        Self {
            bind: config.server.bind.clone(),
            chunk_chars: config.server.chunk_chars,
        }
    }
}

/// The main daemon server
pub struct DaemonServer {
    listener: TcpListener,
    app: Router,
}

impl DaemonServer {
    /// Bind the listener and build the router
    pub async fn bind<B>(orchestrator: RunOrchestrator<B>, config: &ServerConfig) -> Result<Self>
    where
        B: RunBackend + ?Sized + 'static,
    {
        let listener = TcpListener::bind(&config.bind)
            .await
            .with_context(|| format!("Failed to bind {}", config.bind))?;

        info!(
            addr = %listener.local_addr().context("Listener has no local address")?,
            backend = orchestrator.backend().name(),
            chunk_chars = config.chunk_chars,
            "Listening"
        );

        let app = router(AppState::new(orchestrator, config.chunk_chars));
        Ok(Self { listener, app })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Listener has no local address")
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("Server error")?;

        info!("Server stopped");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
