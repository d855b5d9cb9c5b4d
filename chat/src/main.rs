//! Parley Chat
//!
//! Line-mode chat surface: one line of stdin is one user turn, replies
//! stream to stdout as they arrive.
//!
//! # Usage
//!
//! ```bash
//! # Talk to a local daemon
//! parley-chat
//!
//! # Another endpoint, with avatar transcript logging
//! parley-chat --endpoint http://10.0.0.5:3000/api/chat --speak
//! ```
//!
//! # Keys
//!
//! - Ctrl+C while a reply streams: stop the turn
//! - Ctrl+C at the prompt, or EOF: quit

mod display;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_stream::wrappers::LinesStream;
use tracing::warn;

use parley_core::config::{default_config_path, load_config_from_path, ConfigOverrides};
use parley_core::{
    AvatarDriver, AvatarHandle, ChatEvent, ChatSession, HttpTurnTransport, NullAvatar,
    TranscriptAvatar, TurnOptions, TurnOutcome, TurnRejected,
};

use crate::display::{Display, Output};

/// Event channel capacity
const EVENT_BUFFER: usize = 256;

/// Parley line-mode chat
#[derive(Debug, Parser)]
#[command(name = "parley-chat", version, about)]
struct Args {
    /// Turn submission endpoint
    #[arg(long, env = "PARLEY_ENDPOINT")]
    endpoint: Option<String>,

    /// Config file (default: ~/.config/parley/parley.toml)
    #[arg(long, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Summary length hint sent with each turn
    #[arg(long)]
    summary_length: Option<String>,

    /// Retrieval vector ratio sent with each turn (0.0 to 1.0)
    #[arg(long)]
    vector_ratio: Option<f32>,

    /// Hand completed replies to the avatar
    #[arg(long)]
    speak: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so they never mix with the conversation
    let mut filter =
        tracing_subscriber::EnvFilter::from_default_env().add_directive("parley_core=warn".parse()?);
    if args.speak {
        filter = filter.add_directive("parley_core::avatar=info".parse()?);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut config = load_config_from_path(args.config.clone().or_else(default_config_path))
        .context("Failed to load configuration")?;
    if let Some(ref endpoint) = args.endpoint {
        ConfigOverrides::new()
            .with_endpoint(endpoint.clone())
            .apply(&mut config);
    }
    if args.summary_length.is_some() {
        config.client.summary_length.clone_from(&args.summary_length);
    }
    if args.vector_ratio.is_some() {
        config.client.vector_ratio = args.vector_ratio;
    }
    config.validate().context("Invalid configuration")?;

    let transport = Arc::new(
        HttpTurnTransport::new(config.client.endpoint.clone())
            .context("Failed to create HTTP client")?,
    );
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let session = ChatSession::new(transport, events_tx).with_options(TurnOptions {
        vector_ratio: config.client.vector_ratio,
        summary_length: config.client.summary_length.clone(),
    });

    let avatar: Arc<dyn AvatarHandle> = if args.speak {
        Arc::new(TranscriptAvatar::new())
    } else {
        Arc::new(NullAvatar)
    };
    let printer = tokio::spawn(print_events(events_rx, avatar));

    eprintln!(
        "Connected to {} (Ctrl+C stops a reply, Ctrl+D quits)",
        config.client.endpoint
    );

    chat_loop(&session).await?;

    // Closing the event channel lets the printer drain and exit
    drop(session);
    printer.await.context("Event printer failed")?;
    Ok(())
}

/// Read lines until EOF or Ctrl+C at an idle prompt
async fn chat_loop(session: &ChatSession<HttpTurnTransport>) -> anyhow::Result<()> {
    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());

    loop {
        let line = tokio::select! {
            line = lines.next() => line,
            _ = signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            return Ok(());
        };
        let line = line.context("Failed to read stdin")?;

        let turn = session.send_turn(line);
        tokio::pin!(turn);
        let result = loop {
            tokio::select! {
                result = &mut turn => break result,
                _ = signal::ctrl_c() => {
                    session.stop();
                }
            }
        };

        match result {
            Ok(TurnOutcome::Failed(e)) => tracing::debug!(error = %e, "Turn failed"),
            Ok(_) | Err(TurnRejected::EmptyInput) => {}
            Err(e) => warn!(error = %e, "Turn not sent"),
        }
    }
}

/// Write chat events to the terminal and drive the avatar
async fn print_events(mut events: mpsc::Receiver<ChatEvent>, avatar: Arc<dyn AvatarHandle>) {
    let mut driver = AvatarDriver::new(avatar);
    if let Err(e) = driver.initialize().await {
        warn!(error = %e, "Avatar unavailable");
        driver = AvatarDriver::new(Arc::new(NullAvatar));
    }

    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();
    let mut display = Display::new();
    while let Some(event) = events.recv().await {
        for output in display.render(&event) {
            let written = match output {
                Output::Stdout(text) => write_flushed(&mut stdout, &text).await,
                Output::Stderr(text) => write_flushed(&mut stderr, &text).await,
            };
            if let Err(e) = written {
                warn!(error = %e, "Terminal write failed");
            }
        }
        driver.handle(&event).await;
    }
}

async fn write_flushed<W>(out: &mut W, text: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(text.as_bytes()).await?;
    out.flush().await
}
