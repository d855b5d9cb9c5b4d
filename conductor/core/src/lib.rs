//! Parley Core - Conversation Turn Lifecycle
//!
//! This crate provides everything a conversational front-end needs to relay a
//! user turn to an assistant backend and render the reply as it arrives,
//! independent of any UI or HTTP framework.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── client ────────────────────────────┐
//! │  Surface (terminal, avatar, tests)                              │
//! │      ▲ ChatEvent           │ send_turn / stop                   │
//! │      │                     ▼                                    │
//! │  ChatSession ──► MessageList (shared)                           │
//! │      │  StreamConsumer + Utf8StreamDecoder                      │
//! │      ▼                                                          │
//! │  TurnTransport (HTTP)                                           │
//! └──────┼──────────────────────────────────────────────────────────┘
//!        │ POST /api/chat  ◄── streamed UTF-8 reply
//! ┌──────┼──────────────────── server ─────────────────────────────┐
//! │  RunOrchestrator ──► RunBackend (OpenAI Assistants)             │
//! │      thread → message → run → poll → newest message text       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`RunOrchestrator`]: Submits a turn as a polled assistant run
//! - [`ChatSession`]: Client-side turn owner with cancellation
//! - [`MessageList`]: Ordered conversation state
//! - [`AvatarDriver`]: Voices completed replies through an [`AvatarHandle`]
//!
//! # Module Overview
//!
//! - [`avatar`]: Talking-avatar capability
//! - [`backend`]: Run backend abstraction (OpenAI Assistants)
//! - [`config`]: TOML + environment configuration
//! - [`messages`]: Identifiers and surface events
//! - [`orchestrator`]: Server-side run orchestration
//! - [`protocol`]: Turn submission wire types
//! - [`session`]: Message list model
//! - [`streaming`]: Client-side stream consumer
//! - [`transport`]: Client-side turn transport

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod avatar;
pub mod backend;
pub mod config;
pub mod messages;
pub mod orchestrator;
pub mod protocol;
pub mod session;
pub mod streaming;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-exports for convenience
pub use avatar::{AvatarDriver, AvatarError, AvatarHandle, NullAvatar, TranscriptAvatar};
pub use backend::{BackendError, OpenAiAssistants, RunBackend, RunStatus};
pub use messages::{ChatEvent, MessageId, MessageRole, NotifyLevel, RunId, ThreadId};
pub use orchestrator::{PollPolicy, RunError, RunOrchestrator, TurnReply};
pub use protocol::{ErrorBody, TurnRequest, THREAD_HEADER};
pub use session::{Message, MessageList, MessageListError, SharedMessageList};
pub use streaming::{ChatSession, TurnOptions, TurnOutcome, TurnPhase, TurnRejected};
pub use transport::{HttpTurnTransport, TurnError, TurnTransport};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, ParleyConfig, ParleyToml,
};
