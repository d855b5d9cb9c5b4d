//! Parley Daemon
//!
//! HTTP front for the run orchestrator. A chat client posts the conversation
//! history to `POST /api/chat`; the daemon runs the turn against the
//! assistant backend and streams the reply text back, with the backend
//! thread id in the `x-parley-thread` header so the next turn can continue
//! the same thread.
//!
//! # Error Responses
//!
//! | Turn error        | Status |
//! |-------------------|--------|
//! | Malformed body    | 400/415/422 (as axum reports it) |
//! | Configuration     | 500    |
//! | No user message   | 400    |
//! | Backend / run     | 502    |
//! | Poll exhausted    | 504    |
//! | Client went away  | 499 (never read) |
//!
//! Every failure carries a JSON `{ "error", "details" }` body.

#![deny(missing_docs)]

pub mod api;
pub mod server;

pub use api::{router, AppError, AppState};
pub use server::{shutdown_signal, DaemonServer, ServerConfig};
