//! HTTP API
//!
//! - `POST /api/chat`: run one turn, stream the reply text back
//! - `GET /health`: liveness and backend name
//!
//! # Cancellation
//!
//! The turn runs in its own task. The handler holds a [`DropGuard`] on the
//! turn's token, so when the client disconnects and hyper drops the handler,
//! the task sees the cancellation and asks the backend to stop the run.
//!
//! [`DropGuard`]: tokio_util::sync::DropGuard

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use parley_core::{ErrorBody, RunBackend, RunError, RunOrchestrator, TurnReply, TurnRequest, THREAD_HEADER};

/// Status sent when the client went away; nobody reads it
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Shared handler state
pub struct AppState<B: RunBackend + ?Sized> {
    /// Turn orchestrator
    pub orchestrator: RunOrchestrator<B>,
    /// Characters per streamed body chunk
    pub chunk_chars: usize,
}

impl<B: RunBackend + ?Sized> AppState<B> {
    /// Create handler state
    pub fn new(orchestrator: RunOrchestrator<B>, chunk_chars: usize) -> Self {
        Self {
            orchestrator,
            chunk_chars,
        }
    }
}

impl<B: RunBackend + ?Sized> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            chunk_chars: self.chunk_chars,
        }
    }
}

/// Handler errors
#[derive(Debug, Error)]
pub enum AppError {
    /// The body is not a turn request
    #[error(transparent)]
    InvalidRequest(#[from] JsonRejection),

    /// The turn failed
    #[error(transparent)]
    Run(#[from] RunError),

    /// The turn task itself died
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(rejection) => rejection.status(),
            Self::Run(RunError::Configuration(_)) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Run(RunError::NoUserMessage) => StatusCode::BAD_REQUEST,
            Self::Run(
                RunError::Transport(_) | RunError::RunFailed { .. } | RunError::Extraction(_),
            ) => StatusCode::BAD_GATEWAY,
            Self::Run(RunError::PollExhausted { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Run(RunError::Cancelled) => StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            Self::InvalidRequest(rejection) => {
                ErrorBody::new("Invalid request", Some(rejection.body_text()))
            }
            Self::Run(RunError::NoUserMessage) => ErrorBody::new(self.to_string(), None),
            Self::Run(RunError::Configuration(msg)) => {
                ErrorBody::new("Configuration error", Some(msg.clone()))
            }
            _ => ErrorBody::new("Failed to process chat", Some(self.to_string())),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Turn failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "Turn rejected");
        }
        (status, Json(self.body())).into_response()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    backend: String,
}

/// Build the router
pub fn router<B>(state: AppState<B>) -> Router
where
    B: RunBackend + ?Sized + 'static,
{
    Router::new()
        .route("/api/chat", post(chat::<B>))
        .route("/health", get(health::<B>))
        .with_state(state)
}

async fn health<B>(State(state): State<AppState<B>>) -> Json<HealthResponse>
where
    B: RunBackend + ?Sized + 'static,
{
    Json(HealthResponse {
        status: "ok",
        backend: state.orchestrator.backend().name().to_string(),
    })
}

async fn chat<B>(
    State(state): State<AppState<B>>,
    payload: Result<Json<TurnRequest>, JsonRejection>,
) -> Result<Response, AppError>
where
    B: RunBackend + ?Sized + 'static,
{
    let Json(request) = payload?;
    tracing::debug!(
        messages = request.messages.len(),
        thread_id = ?request.thread_id,
        summary_length = ?request.summary_length,
        "Turn received"
    );

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let orchestrator = state.orchestrator.clone();
    let turn = tokio::spawn(async move {
        orchestrator
            .submit_turn(&request.messages, request.thread_id, &cancel)
            .await
    });

    let result = turn
        .await
        .map_err(|e| AppError::Internal(format!("turn task failed: {e}")))?;
    guard.disarm();

    let reply = result?;
    reply_response(&reply, state.chunk_chars)
}

/// Stream `reply.text` as UTF-8 chunks of at most `chunk_chars` characters
fn reply_response(reply: &TurnReply, chunk_chars: usize) -> Result<Response, AppError> {
    let thread = HeaderValue::from_str(&reply.thread_id.0)
        .map_err(|e| AppError::Internal(format!("thread id is not a valid header: {e}")))?;

    let chunks = chunk_text(&reply.text, chunk_chars);
    let body = Body::from_stream(futures::stream::iter(
        chunks.into_iter().map(Ok::<_, Infallible>),
    ));

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            ),
            (HeaderName::from_static(THREAD_HEADER), thread),
        ],
        body,
    )
        .into_response())
}

/// Split on char boundaries
fn chunk_text(text: &str, chunk_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_chars.max(1))
        .map(|c| c.iter().collect())
        .collect()
}
