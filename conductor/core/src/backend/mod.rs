//! Run Backend Integration
//!
//! This module provides abstracted access to assistant-execution backends
//! through a common trait interface.
//!
//! # Available Backends
//!
//! - **OpenAI Assistants**: threads + polled runs (default)
//!
//! # Usage
//!
//! ```ignore
//! use parley_core::backend::{OpenAiAssistants, RunBackend, DEFAULT_BASE_URL};
//!
//! let backend = OpenAiAssistants::new(api_key, DEFAULT_BASE_URL)?;
//! let thread = backend.create_thread().await?;
//! let run = backend.create_run(&thread, "asst_123").await?;
//! ```

mod openai;
mod traits;

pub use openai::{OpenAiAssistants, DEFAULT_BASE_URL};
pub use traits::{
    BackendError, ContentPart, Run, RunBackend, RunStatus, TextContent, ThreadMessage,
};
