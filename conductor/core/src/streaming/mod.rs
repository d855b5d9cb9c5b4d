//! Stream Consumer
//!
//! Client side of a conversation turn: submit the history, merge the reply
//! bytes into the assistant placeholder as they arrive, and settle the
//! placeholder when the stream ends, fails, or is cancelled.
//!
//! # Turn Lifecycle
//!
//! ```text
//!   Idle ──send_turn──► Submitted ──response──► Streaming
//!                          │                       │
//!                          │        ┌──────────────┼──────────────┐
//!                          ▼        ▼              ▼              ▼
//!                       Failed ◄── error     Cancelled (stop)  Completed
//! ```
//!
//! | Outcome   | Placeholder                   | Event                    |
//! |-----------|-------------------------------|--------------------------|
//! | Completed | accumulated reply             | `TurnCompleted(message)` |
//! | Cancelled | `"Cancelled."`                | `TurnCancelled { id }`   |
//! | Failed    | removed, apology appended     | `Toast { Error, .. }`    |
//!
//! Every turn is bracketed by `Loading(true)` and `Loading(false)`.
//!
//! # Example
//!
//! ```ignore
//! use parley_core::streaming::ChatSession;
//! use parley_core::transport::HttpTurnTransport;
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! let transport = Arc::new(HttpTurnTransport::new("http://127.0.0.1:3000/api/chat")?);
//! let (tx, mut rx) = mpsc::channel(100);
//! let session = Arc::new(ChatSession::new(transport, tx));
//!
//! let outcome = session.send_turn("Hi").await?;
//! ```

mod consumer;
mod decoder;
mod session;

pub use consumer::TurnOutcome;
pub use decoder::{DecodeError, Utf8StreamDecoder};
pub use session::{
    ChatSession, TurnOptions, TurnPhase, TurnRejected, APOLOGY_TEXT, CANCELLED_TEXT,
};
