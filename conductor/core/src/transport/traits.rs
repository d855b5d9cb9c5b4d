//! Transport traits and errors

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::messages::ThreadId;
use crate::protocol::TurnRequest;

/// Client-side turn failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TurnError {
    /// The endpoint answered with a non-success status
    #[error("{detail}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// `details`, else `error`, else `Error: {status}`
        detail: String,
    },

    /// Connection failed or dropped mid-stream
    #[error("network error: {0}")]
    Network(String),

    /// The reply bytes were not valid UTF-8
    #[error("could not decode reply: {0}")]
    Decode(String),
}

/// Raw reply bytes, in arrival order
pub type ReplyStream = BoxStream<'static, Result<Vec<u8>, TurnError>>;

/// An accepted turn whose reply is still arriving
pub struct TurnResponse {
    /// Backend thread the reply belongs to, when the endpoint reported one
    pub thread_id: Option<ThreadId>,
    /// Reply body
    pub body: ReplyStream,
}

impl std::fmt::Debug for TurnResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnResponse")
            .field("thread_id", &self.thread_id)
            .finish_non_exhaustive()
    }
}

/// Opens turns against a turn submission endpoint
#[async_trait]
pub trait TurnTransport: Send + Sync {
    /// Submit a turn and return the streaming reply
    ///
    /// Resolves once the endpoint has accepted or rejected the turn; the
    /// reply itself is read from [`TurnResponse::body`].
    async fn open(&self, request: &TurnRequest) -> Result<TurnResponse, TurnError>;
}
