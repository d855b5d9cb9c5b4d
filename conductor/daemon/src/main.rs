//! Parley Daemon
//!
//! Standalone server process exposing the turn submission endpoint.
//!
//! # Usage
//!
//! ```bash
//! # Start with settings from ~/.config/parley/parley.toml and the environment
//! OPENAI_API_KEY=sk-... OPENAI_ASSISTANT_ID=asst_... parley-daemon
//!
//! # Listen elsewhere, poll faster
//! parley-daemon --bind 0.0.0.0:8080 --poll-interval-ms 500
//!
//! # With verbose logging
//! RUST_LOG=debug parley-daemon
//! ```
//!
//! # Environment Variables
//!
//! - `OPENAI_API_KEY`: API key (required)
//! - `OPENAI_ASSISTANT_ID`: Assistant to run (required for turns)
//! - `OPENAI_BASE_URL`: API base URL
//! - `PARLEY_BIND`: Listen address (default: 127.0.0.1:3000)
//! - `PARLEY_POLL_INTERVAL_MS`, `PARLEY_POLL_MAX_ATTEMPTS`, `PARLEY_POLL_DEADLINE_SECS`
//! - `PARLEY_CONFIG`: Config file path
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)
//!
//! # Signals
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use parley_core::config::{default_config_path, load_config_from_path, ConfigOverrides};
use parley_core::RunOrchestrator;
use parley_daemon::{shutdown_signal, DaemonServer, ServerConfig};

/// Parley turn endpoint
#[derive(Debug, Parser)]
#[command(name = "parley-daemon", version, about)]
struct Args {
    /// Config file (default: ~/.config/parley/parley.toml)
    #[arg(long, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address
    #[arg(long)]
    bind: Option<String>,

    /// Assistant to run turns against
    #[arg(long)]
    assistant_id: Option<String>,

    /// Wait between run status checks, in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Give up after this many run status checks
    #[arg(long)]
    poll_max_attempts: Option<u32>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref bind) = self.bind {
            overrides = overrides.with_bind(bind.clone());
        }
        if let Some(ref id) = self.assistant_id {
            overrides = overrides.with_assistant_id(id.clone());
        }
        if let Some(ms) = self.poll_interval_ms {
            overrides = overrides.with_poll_interval_ms(ms);
        }
        if let Some(n) = self.poll_max_attempts {
            overrides = overrides.with_poll_max_attempts(n);
        }
        overrides
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("parley_daemon=info".parse()?)
                .add_directive("parley_core=info".parse()?),
        )
        .with_target(true)
        .init();

    let args = Args::parse();

    let mut config = load_config_from_path(args.config.clone().or_else(default_config_path))
        .context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        source = %config.source(),
        config_file = ?config.config_file_path,
        "Starting Parley Daemon"
    );
    if config.assistant.assistant_id.is_none() {
        warn!("No assistant id configured; turns will fail until OPENAI_ASSISTANT_ID is set");
    }

    let orchestrator =
        RunOrchestrator::from_config(&config).context("Failed to create run orchestrator")?;
    let server = DaemonServer::bind(orchestrator, &ServerConfig::from(&config)).await?;

    server.run(shutdown_signal()).await
}
