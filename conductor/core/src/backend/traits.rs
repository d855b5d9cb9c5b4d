//! Run Backend Traits
//!
//! Trait definitions for assistant-execution backends. A backend groups
//! messages into threads and executes the assistant against a thread as an
//! asynchronous run that must be polled to completion.
//!
//! # Design Philosophy
//!
//! The [`RunBackend`] trait provides a common interface for:
//! - Thread creation and lookup
//! - Appending the new user message
//! - Starting, polling, and cancelling runs
//! - Listing thread messages (newest first)
//!
//! Implementations translate vendor error shapes into [`BackendError`] at the
//! edge, so nothing above this module sees a provider-specific payload.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messages::{RunId, ThreadId};

/// Errors raised by a run backend
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend answered with a non-success status
    #[error("backend returned {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Vendor error message, if one was provided
        message: String,
    },

    /// The request never got a response
    #[error("network error: {0}")]
    Network(String),

    /// The response body was not what we expected
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Lifecycle status of a run
///
/// Unknown statuses are kept verbatim in [`RunStatus::Other`] and treated as
/// terminal, non-successful outcomes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    /// Waiting to be picked up
    Queued,
    /// Executing
    InProgress,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Cancelled before completion
    Cancelled,
    /// Timed out on the backend
    Expired,
    /// Any status this client does not model
    Other(String),
}

impl RunStatus {
    /// Whether the run is still working (keep polling)
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Queued | Self::InProgress)
    }

    /// Wire name of the status
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Other(raw) => raw,
        }
    }
}

impl From<&str> for RunStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "queued" => Self::Queued,
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            "expired" => Self::Expired,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for RunStatus {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<RunStatus> for String {
    fn from(status: RunStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution of the assistant against a thread
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    /// Run identifier
    pub id: RunId,
    /// Thread the run executes against
    pub thread_id: ThreadId,
    /// Current status
    pub status: RunStatus,
}

/// Text payload of a content part
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextContent {
    /// The text itself
    pub value: String,
}

/// One part of a thread message's content
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text
    Text {
        /// The text payload
        text: TextContent,
    },
    /// Images, files, refusals, anything that is not text
    #[serde(other)]
    Unsupported,
}

/// A message stored in a backend thread
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    /// Backend message identifier
    pub id: String,
    /// Role as reported by the backend
    pub role: String,
    /// Content parts, in order
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

impl ThreadMessage {
    /// The first textual content part, if any
    #[must_use]
    pub fn primary_text(&self) -> Option<&str> {
        self.content.iter().find_map(|part| match part {
            ContentPart::Text { text } => Some(text.value.as_str()),
            ContentPart::Unsupported => None,
        })
    }
}

/// Assistant-execution backend
///
/// Implement this trait to add support for different run providers.
#[async_trait]
pub trait RunBackend: Send + Sync {
    /// Get the backend name (e.g., "OpenAI Assistants")
    fn name(&self) -> &str;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Create a new, empty thread
    async fn create_thread(&self) -> Result<ThreadId, BackendError>;

    /// Look up an existing thread
    async fn retrieve_thread(&self, thread_id: &ThreadId) -> Result<ThreadId, BackendError>;

    /// Append a user message to a thread
    async fn append_user_message(
        &self,
        thread_id: &ThreadId,
        content: &str,
    ) -> Result<(), BackendError>;

    /// Start a run of `assistant_id` against a thread
    async fn create_run(
        &self,
        thread_id: &ThreadId,
        assistant_id: &str,
    ) -> Result<Run, BackendError>;

    /// Read the current state of a run
    async fn retrieve_run(&self, thread_id: &ThreadId, run_id: &RunId)
        -> Result<Run, BackendError>;

    /// Ask the backend to stop a run
    async fn cancel_run(&self, thread_id: &ThreadId, run_id: &RunId) -> Result<Run, BackendError>;

    /// List thread messages, newest first
    async fn list_messages(&self, thread_id: &ThreadId) -> Result<Vec<ThreadMessage>, BackendError>;
}
