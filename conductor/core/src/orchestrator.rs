//! Run Orchestrator
//!
//! Submits one user turn to an asynchronous assistant run, polls the run
//! until it reaches a terminal status, and extracts the reply text.
//!
//! # Turn Flow
//!
//! ```text
//! history ──► latest user message
//!                 │
//!                 ▼
//!   thread (reuse or create) ──► append message ──► create run
//!                                                      │
//!                  ┌───────────── queued / in_progress ┤
//!                  │   wait one interval tick          │
//!                  └──────────────► retrieve run ──────┤
//!                                                      ▼
//!                  completed ──► newest message ──► first text part
//!                  anything else ──► RunFailed { status }
//! ```
//!
//! # Design Philosophy
//!
//! - Waiting is `tokio::time::interval`, never sleep.
//! - Every suspension point races the caller's [`CancellationToken`]. A
//!   cancelled or exhausted turn asks the backend to stop the run.
//! - The orchestrator holds only immutable configuration and a shared
//!   backend, so one instance serves concurrent requests.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendError, OpenAiAssistants, Run, RunBackend, RunStatus};
use crate::config::ParleyConfig;
use crate::messages::ThreadId;
use crate::session::{last_user_message, Message};

/// Upper bound on the best-effort remote cancel
const CANCEL_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from a single turn
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunError {
    /// Missing assistant identity or credentials
    #[error("{0}")]
    Configuration(String),

    /// History has no user message to answer
    #[error("No user message found")]
    NoUserMessage,

    /// A backend call failed
    #[error(transparent)]
    Transport(#[from] BackendError),

    /// The run ended in a terminal status other than `completed`
    #[error("Run ended with status: {status}")]
    RunFailed {
        /// Terminal status, verbatim
        status: RunStatus,
    },

    /// The run completed without a usable text reply
    #[error("{0}")]
    Extraction(String),

    /// The configured poll bounds ran out before a terminal status
    #[error("Run still {last_status} after {attempts} status checks")]
    PollExhausted {
        /// Status reads performed
        attempts: u32,
        /// Last status observed
        last_status: RunStatus,
    },

    /// The caller cancelled the turn
    #[error("Turn cancelled")]
    Cancelled,
}

/// Bounds on run polling
///
/// The default polls every second with no attempt limit and no deadline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Wait between status reads
    pub interval: Duration,
    /// Maximum status reads
    pub max_attempts: Option<u32>,
    /// Maximum total time spent polling
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: None,
            deadline: None,
        }
    }
}

impl PollPolicy {
    /// Unbounded polling at `interval`
    #[must_use]
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// Limit the number of status reads
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Limit the total polling time
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Reply to one turn
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnReply {
    /// Thread the turn ran on; pass it back to continue the conversation
    pub thread_id: ThreadId,
    /// Assistant reply text
    pub text: String,
}

/// Last observation of a run while polling
struct PollProgress {
    attempts: u32,
    last_status: RunStatus,
}

impl PollProgress {
    fn exhausted(&self) -> RunError {
        RunError::PollExhausted {
            attempts: self.attempts,
            last_status: self.last_status.clone(),
        }
    }
}

/// Drives turns through a [`RunBackend`]
pub struct RunOrchestrator<B: RunBackend + ?Sized> {
    backend: Arc<B>,
    assistant_id: Option<String>,
    policy: PollPolicy,
}

impl<B: RunBackend + ?Sized> Clone for RunOrchestrator<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            assistant_id: self.assistant_id.clone(),
            policy: self.policy.clone(),
        }
    }
}

impl<B: RunBackend + ?Sized> std::fmt::Debug for RunOrchestrator<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOrchestrator")
            .field("backend", &self.backend.name())
            .field("assistant_id", &self.assistant_id)
            .field("policy", &self.policy)
            .finish()
    }
}

impl RunOrchestrator<OpenAiAssistants> {
    /// Build an orchestrator over the OpenAI Assistants API
    ///
    /// A missing API key is a configuration error here. A missing assistant
    /// id is reported per turn instead, so the daemon can still start and
    /// answer `/health`.
    pub fn from_config(config: &ParleyConfig) -> Result<Self, RunError> {
        let api_key = config
            .assistant
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| RunError::Configuration("OpenAI API key is not configured".to_string()))?;

        let backend = OpenAiAssistants::new(api_key, config.assistant.base_url.clone())?;
        Ok(Self::new(
            Arc::new(backend),
            config.assistant.assistant_id.clone(),
            config.polling.clone(),
        ))
    }
}

impl<B: RunBackend + ?Sized> RunOrchestrator<B> {
    /// Create an orchestrator
    pub fn new(backend: Arc<B>, assistant_id: Option<String>, policy: PollPolicy) -> Self {
        Self {
            backend,
            assistant_id: assistant_id.filter(|id| !id.is_empty()),
            policy,
        }
    }

    /// Backend in use
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Poll policy in use
    #[must_use]
    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Run one turn to completion
    ///
    /// Only the most recent user message in `history` is sent; earlier
    /// messages are already on the thread when `thread_id` is reused.
    pub async fn submit_turn(
        &self,
        history: &[Message],
        thread_id: Option<ThreadId>,
        cancel: &CancellationToken,
    ) -> Result<TurnReply, RunError> {
        let assistant_id = self.assistant_id.as_deref().ok_or_else(|| {
            RunError::Configuration("OpenAI Assistant ID is not configured".to_string())
        })?;
        let latest = last_user_message(history).ok_or(RunError::NoUserMessage)?;

        let thread_id = match thread_id {
            Some(id) => guarded(cancel, self.backend.retrieve_thread(&id)).await?,
            None => guarded(cancel, self.backend.create_thread()).await?,
        };
        guarded(
            cancel,
            self.backend.append_user_message(&thread_id, &latest.content),
        )
        .await?;

        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        // Not raced: once requested, the run must be known so it can be cancelled
        let run = self.backend.create_run(&thread_id, assistant_id).await?;
        tracing::debug!(
            backend = self.backend.name(),
            thread_id = %thread_id,
            run_id = %run.id,
            status = %run.status,
            "Run created"
        );

        let status = match self.await_terminal(&run, cancel).await {
            Ok(status) => status,
            Err(err @ (RunError::Cancelled | RunError::PollExhausted { .. })) => {
                self.cancel_remote(&run).await;
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        if status != RunStatus::Completed {
            tracing::warn!(run_id = %run.id, status = %status, "Run did not complete");
            return Err(RunError::RunFailed { status });
        }

        let messages = guarded(cancel, self.backend.list_messages(&thread_id)).await?;
        let text = messages
            .first()
            .and_then(|m| m.primary_text())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RunError::Extraction("No text content found in response".to_string()))?;

        tracing::info!(
            thread_id = %thread_id,
            run_id = %run.id,
            chars = text.len(),
            "Turn completed"
        );

        Ok(TurnReply {
            thread_id,
            text: text.to_string(),
        })
    }

    /// Poll `run` until it leaves `queued`/`in_progress`
    async fn await_terminal(
        &self,
        run: &Run,
        cancel: &CancellationToken,
    ) -> Result<RunStatus, RunError> {
        let mut progress = PollProgress {
            attempts: 0,
            last_status: run.status.clone(),
        };

        let outcome = match self.policy.deadline {
            Some(deadline) => {
                let polling = self.poll_loop(run, &mut progress, cancel);
                tokio::time::timeout(deadline, polling).await
            }
            None => Ok(self.poll_loop(run, &mut progress, cancel).await),
        };

        match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    run_id = %run.id,
                    attempts = progress.attempts,
                    "Run poll deadline reached"
                );
                Err(progress.exhausted())
            }
        }
    }

    async fn poll_loop(
        &self,
        run: &Run,
        progress: &mut PollProgress,
        cancel: &CancellationToken,
    ) -> Result<RunStatus, RunError> {
        // tokio panics on a zero period
        let period = self.policy.interval.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        interval.tick().await;

        loop {
            let current = guarded(
                cancel,
                self.backend.retrieve_run(&run.thread_id, &run.id),
            )
            .await?;
            progress.attempts += 1;
            progress.last_status = current.status.clone();

            tracing::debug!(
                run_id = %run.id,
                attempt = progress.attempts,
                status = %current.status,
                "Polled run"
            );

            if !current.status.is_pending() {
                return Ok(current.status);
            }

            if let Some(max) = self.policy.max_attempts {
                if progress.attempts >= max {
                    tracing::warn!(run_id = %run.id, attempts = max, "Run poll attempts exhausted");
                    return Err(progress.exhausted());
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(RunError::Cancelled),
                _ = interval.tick() => {}
            }
        }
    }

    /// Ask the backend to stop a run we are abandoning; failures are only logged
    async fn cancel_remote(&self, run: &Run) {
        match tokio::time::timeout(
            CANCEL_TIMEOUT,
            self.backend.cancel_run(&run.thread_id, &run.id),
        )
        .await
        {
            Ok(Ok(cancelled)) => {
                tracing::info!(run_id = %run.id, status = %cancelled.status, "Remote run cancelled");
            }
            Ok(Err(e)) => {
                tracing::warn!(run_id = %run.id, error = %e, "Failed to cancel remote run");
            }
            Err(_) => {
                tracing::warn!(run_id = %run.id, "Timed out cancelling remote run");
            }
        }
    }
}

/// Race a backend call against cancellation
async fn guarded<T, F>(cancel: &CancellationToken, call: F) -> Result<T, RunError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(RunError::Cancelled),
        result = call => result.map_err(RunError::from),
    }
}
