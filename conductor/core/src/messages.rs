//! Identifiers and Surface Events
//!
//! Identifiers shared by every layer (messages, threads, runs) and the events
//! a [`ChatSession`](crate::streaming::ChatSession) publishes to whatever
//! surface is rendering the conversation.
//!
//! # Design Philosophy
//!
//! Surfaces are renderers. They read the shared message list and react to
//! [`ChatEvent`]s; they never decide what a turn means. The same events drive
//! a terminal transcript, an avatar, or a test harness.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::session::Message;

/// Message identifier
///
/// UUID v4 strings, so ids stay unique across processes and are never
/// reused within a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-side thread identifier, as issued by the run backend
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub String);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Run identifier, as issued by the run backend
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User input
    User,
    /// AI assistant
    Assistant,
}

impl MessageRole {
    /// Wire name of the role
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Notification levels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyLevel {
    /// Informational
    Info,
    /// Warning
    Warning,
    /// Error
    Error,
}

/// Events from a chat session to UI surfaces
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    /// Loading flag changed (true for the whole submitted/streaming span)
    Loading(bool),

    /// The in-flight assistant message grew
    Delta {
        /// Placeholder message being streamed into
        id: MessageId,
        /// Full accumulated content so far
        content: String,
    },

    /// The stream ended and the assistant message is final
    ///
    /// This is the signal avatar playback reacts to.
    TurnCompleted(Message),

    /// The turn was cancelled by the user
    TurnCancelled {
        /// Placeholder message that now holds the cancellation marker
        id: MessageId,
    },

    /// Developer-facing notification (toast)
    Toast {
        /// Severity
        level: NotifyLevel,
        /// Short title
        title: String,
        /// Underlying detail
        description: String,
    },
}
