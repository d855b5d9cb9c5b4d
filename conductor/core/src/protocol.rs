//! Turn Submission Wire Protocol
//!
//! JSON shapes shared by the daemon's `POST /api/chat` endpoint and the
//! client-side [`HttpTurnTransport`](crate::transport::HttpTurnTransport).
//!
//! A successful response is a plain UTF-8 body carrying the reply text, with
//! the backend thread id in the [`THREAD_HEADER`] response header. A failed
//! response is an [`ErrorBody`].

use serde::{Deserialize, Serialize};

use crate::messages::ThreadId;
use crate::session::Message;

/// Response header carrying the backend thread id
pub const THREAD_HEADER: &str = "x-parley-thread";

/// Summary length sent when the caller does not choose one
pub const DEFAULT_SUMMARY_LENGTH: &str = "none";

/// Body of a turn submission
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    /// Full conversation history, oldest first
    pub messages: Vec<Message>,

    /// Retrieval tuning: share of context taken from vector search
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_ratio: Option<f32>,

    /// Retrieval tuning: summary length hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_length: Option<String>,

    /// Thread to continue; a new thread is created when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<ThreadId>,
}

impl TurnRequest {
    /// Request carrying only the history
    #[must_use]
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            vector_ratio: None,
            summary_length: None,
            thread_id: None,
        }
    }
}

/// JSON body of a failed turn submission
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Short error category
    pub error: String,

    /// Longer human-readable explanation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    /// Create an error body
    pub fn new(error: impl Into<String>, details: Option<String>) -> Self {
        Self {
            error: error.into(),
            details,
        }
    }

    /// The most specific message available: `details`, else `error`
    #[must_use]
    pub fn detail(&self) -> &str {
        self.details
            .as_deref()
            .filter(|d| !d.is_empty())
            .unwrap_or(&self.error)
    }
}

/// Human-readable detail for a rejected submission
///
/// Uses the body's `details`, then `error`, then falls back to `Error: {status}`
/// when the body is missing or not an [`ErrorBody`].
#[must_use]
pub fn rejection_detail(status: u16, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| b.detail().to_string())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| format!("Error: {status}"))
}
