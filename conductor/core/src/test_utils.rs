//! Test Utilities
//!
//! Scripted stand-ins for the two network seams, so the orchestrator, the
//! stream consumer and the daemon can be exercised without a real backend.
//!
//! # Usage
//!
//! ```ignore
//! use parley_core::test_utils::{ScriptedBackend, ScriptedTransport};
//!
//! // Run statuses are returned in order; the last one repeats
//! let backend = ScriptedBackend::new()
//!     .with_statuses(["queued", "in_progress", "completed"])
//!     .with_reply("Hello!");
//!
//! // Chunks are emitted in order, then the body ends
//! let transport = ScriptedTransport::new().with_chunks(["Hel", "lo!"]);
//! ```
//!
//! Enabled for this crate's unit tests and, through the `test-utils`
//! feature, for downstream crates' tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendError, ContentPart, Run, RunBackend, RunStatus, TextContent, ThreadMessage};
use crate::messages::{RunId, ThreadId};
use crate::protocol::TurnRequest;
use crate::transport::{TurnError, TurnResponse, TurnTransport};

// ============================================================================
// Scripted Run Backend
// ============================================================================

/// A call received by [`ScriptedBackend`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendCall {
    /// `create_thread`
    CreateThread,
    /// `retrieve_thread`
    RetrieveThread(ThreadId),
    /// `append_user_message`
    AppendUserMessage {
        /// Target thread
        thread_id: ThreadId,
        /// Message text
        content: String,
    },
    /// `create_run`
    CreateRun {
        /// Target thread
        thread_id: ThreadId,
        /// Assistant the run was started for
        assistant_id: String,
    },
    /// `retrieve_run`
    RetrieveRun(RunId),
    /// `cancel_run`
    CancelRun(RunId),
    /// `list_messages`
    ListMessages(ThreadId),
}

/// Backend operation that can be made to fail
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailPoint {
    /// `create_thread` / `retrieve_thread`
    Thread,
    /// `append_user_message`
    AppendMessage,
    /// `create_run`
    CreateRun,
    /// `retrieve_run`
    RetrieveRun,
    /// `list_messages`
    ListMessages,
}

/// Run backend that replays a script
///
/// Runs report the scripted statuses in order, one per `retrieve_run`, and
/// keep repeating the last one. The thread's newest message is whatever
/// [`with_reply`](Self::with_reply) set; without one the thread is empty.
pub struct ScriptedBackend {
    statuses: Mutex<VecDeque<RunStatus>>,
    reply: Option<ThreadMessage>,
    failure: Option<(FailPoint, BackendError)>,
    cancel_after: Option<(usize, CancellationToken)>,
    cancel_on_create: Option<CancellationToken>,
    calls: Mutex<Vec<BackendCall>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    /// Backend whose runs complete on the first status check
    #[must_use]
    pub fn new() -> Self {
        Self {
            statuses: Mutex::new(VecDeque::from([RunStatus::Completed])),
            reply: None,
            failure: None,
            cancel_after: None,
            cancel_on_create: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Statuses returned by successive `retrieve_run` calls
    #[must_use]
    pub fn with_statuses<I, S>(self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let statuses: VecDeque<RunStatus> =
            statuses.into_iter().map(|s| RunStatus::from(s.into())).collect();
        if !statuses.is_empty() {
            *self.statuses.lock() = statuses;
        }
        self
    }

    /// Newest thread message carries `text`
    #[must_use]
    pub fn with_reply(mut self, text: impl Into<String>) -> Self {
        self.reply = Some(ThreadMessage {
            id: "msg_reply".to_string(),
            role: "assistant".to_string(),
            content: vec![ContentPart::Text {
                text: TextContent { value: text.into() },
            }],
        });
        self
    }

    /// Newest thread message has only non-text content
    #[must_use]
    pub fn with_non_text_reply(mut self) -> Self {
        self.reply = Some(ThreadMessage {
            id: "msg_reply".to_string(),
            role: "assistant".to_string(),
            content: vec![ContentPart::Unsupported],
        });
        self
    }

    /// Fail the given operation with `error`
    #[must_use]
    pub fn failing_at(mut self, point: FailPoint, error: BackendError) -> Self {
        self.failure = Some((point, error));
        self
    }

    /// Trigger `token` while answering the `n`th `retrieve_run`
    #[must_use]
    pub fn cancel_after_retrieves(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    /// Trigger `token` while `create_run` is in flight
    #[must_use]
    pub fn cancel_during_create_run(mut self, token: CancellationToken) -> Self {
        self.cancel_on_create = Some(token);
        self
    }

    /// Every call received so far
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    /// Number of `retrieve_run` calls
    #[must_use]
    pub fn retrieve_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, BackendCall::RetrieveRun(_)))
            .count()
    }

    /// Whether `cancel_run` was called
    #[must_use]
    pub fn cancel_requested(&self) -> bool {
        self.calls
            .lock()
            .iter()
            .any(|c| matches!(c, BackendCall::CancelRun(_)))
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().push(call);
    }

    fn check(&self, point: FailPoint) -> Result<(), BackendError> {
        match &self.failure {
            Some((p, err)) if *p == point => Err(err.clone()),
            _ => Ok(()),
        }
    }

    fn next_status(&self) -> RunStatus {
        let mut statuses = self.statuses.lock();
        if statuses.len() > 1 {
            statuses.pop_front().unwrap_or(RunStatus::Completed)
        } else {
            statuses.front().cloned().unwrap_or(RunStatus::Completed)
        }
    }

    fn run(thread_id: &ThreadId, status: RunStatus) -> Run {
        Run {
            id: RunId::from("run_1"),
            thread_id: thread_id.clone(),
            status,
        }
    }
}

#[async_trait]
impl RunBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn create_thread(&self) -> Result<ThreadId, BackendError> {
        self.record(BackendCall::CreateThread);
        self.check(FailPoint::Thread)?;
        Ok(ThreadId::from("thread_1"))
    }

    async fn retrieve_thread(&self, thread_id: &ThreadId) -> Result<ThreadId, BackendError> {
        self.record(BackendCall::RetrieveThread(thread_id.clone()));
        self.check(FailPoint::Thread)?;
        Ok(thread_id.clone())
    }

    async fn append_user_message(
        &self,
        thread_id: &ThreadId,
        content: &str,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::AppendUserMessage {
            thread_id: thread_id.clone(),
            content: content.to_string(),
        });
        self.check(FailPoint::AppendMessage)
    }

    async fn create_run(
        &self,
        thread_id: &ThreadId,
        assistant_id: &str,
    ) -> Result<Run, BackendError> {
        self.record(BackendCall::CreateRun {
            thread_id: thread_id.clone(),
            assistant_id: assistant_id.to_string(),
        });
        self.check(FailPoint::CreateRun)?;
        if let Some(token) = &self.cancel_on_create {
            token.cancel();
            tokio::task::yield_now().await;
        }
        Ok(Self::run(thread_id, RunStatus::Queued))
    }

    async fn retrieve_run(&self, thread_id: &ThreadId, run_id: &RunId) -> Result<Run, BackendError> {
        self.record(BackendCall::RetrieveRun(run_id.clone()));
        self.check(FailPoint::RetrieveRun)?;

        if let Some((n, token)) = &self.cancel_after {
            if self.retrieve_count() >= *n {
                token.cancel();
            }
        }

        Ok(Self::run(thread_id, self.next_status()))
    }

    async fn cancel_run(&self, thread_id: &ThreadId, run_id: &RunId) -> Result<Run, BackendError> {
        self.record(BackendCall::CancelRun(run_id.clone()));
        Ok(Self::run(thread_id, RunStatus::from("cancelling")))
    }

    async fn list_messages(&self, thread_id: &ThreadId) -> Result<Vec<ThreadMessage>, BackendError> {
        self.record(BackendCall::ListMessages(thread_id.clone()));
        self.check(FailPoint::ListMessages)?;
        Ok(self.reply.iter().cloned().collect())
    }
}

// ============================================================================
// Scripted Turn Transport
// ============================================================================

/// Turn transport that replays scripted reply chunks
///
/// Each `open` records the request and returns the scripted chunks. With
/// [`hang_after`](Self::hang_after) the body stays open after the given
/// number of chunks, so a test can cancel mid-stream.
#[derive(Default)]
pub struct ScriptedTransport {
    chunks: Vec<Vec<u8>>,
    thread_id: Option<ThreadId>,
    reject: Option<TurnError>,
    fail_after: Option<(usize, TurnError)>,
    hang_after: Option<usize>,
    requests: Mutex<Vec<TurnRequest>>,
}

impl ScriptedTransport {
    /// Transport whose replies are empty
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with these text chunks
    #[must_use]
    pub fn with_chunks<I, S>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chunks = chunks.into_iter().map(|c| c.into().into_bytes()).collect();
        self
    }

    /// Reply with these raw byte chunks
    #[must_use]
    pub fn with_byte_chunks(mut self, chunks: Vec<Vec<u8>>) -> Self {
        self.chunks = chunks;
        self
    }

    /// Report `thread_id` with every reply
    #[must_use]
    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(ThreadId(thread_id.into()));
        self
    }

    /// Reject every turn with `error`
    #[must_use]
    pub fn rejecting(mut self, error: TurnError) -> Self {
        self.reject = Some(error);
        self
    }

    /// Emit `error` after `n` chunks
    #[must_use]
    pub fn failing_after(mut self, n: usize, error: TurnError) -> Self {
        self.fail_after = Some((n, error));
        self
    }

    /// Keep the body open after `n` chunks
    #[must_use]
    pub fn hang_after(mut self, n: usize) -> Self {
        self.hang_after = Some(n);
        self
    }

    /// Requests received so far
    #[must_use]
    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl TurnTransport for ScriptedTransport {
    async fn open(&self, request: &TurnRequest) -> Result<TurnResponse, TurnError> {
        self.requests.lock().push(request.clone());

        if let Some(err) = &self.reject {
            return Err(err.clone());
        }

        let mut items: Vec<Result<Vec<u8>, TurnError>> = self.chunks.iter().cloned().map(Ok).collect();
        if let Some((n, err)) = &self.fail_after {
            items.truncate(*n);
            items.push(Err(err.clone()));
        }

        let body = match self.hang_after {
            Some(n) => {
                items.truncate(n);
                futures::stream::iter(items)
                    .chain(futures::stream::pending())
                    .boxed()
            }
            None => futures::stream::iter(items).boxed(),
        };

        Ok(TurnResponse {
            thread_id: self.thread_id.clone(),
            body,
        })
    }
}
