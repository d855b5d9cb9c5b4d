//! Avatar Capability
//!
//! A talking avatar that voices finished assistant replies.
//!
//! # Design Philosophy
//!
//! The avatar is a renderer like any other surface: it owns no conversation
//! state, it only reacts to [`ChatEvent`]s. [`AvatarDriver`] turns the event
//! stream into three calls on an [`AvatarHandle`]:
//!
//! - `initialize` once, before the first turn
//! - `speak` when a turn completes with non-empty text
//! - `cancel` when a new turn starts while the last reply may still be playing
//!
//! How speech is actually rendered (video, audio, text) is up to the handle.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::messages::ChatEvent;

/// Avatar start-up failure
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AvatarError {
    /// The avatar session could not be created
    #[error("avatar failed to initialize: {0}")]
    Initialize(String),
}

/// Something that can voice assistant replies
#[async_trait]
pub trait AvatarHandle: Send + Sync {
    /// Prepare the avatar session
    async fn initialize(&self) -> Result<(), AvatarError>;

    /// Voice `text`; empty text is ignored
    async fn speak(&self, text: &str);

    /// Interrupt whatever is playing
    async fn cancel(&self);
}

/// Avatar that does nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NullAvatar;

#[async_trait]
impl AvatarHandle for NullAvatar {
    async fn initialize(&self) -> Result<(), AvatarError> {
        Ok(())
    }

    async fn speak(&self, _text: &str) {}

    async fn cancel(&self) {}
}

/// Avatar that logs what it would say and keeps a transcript
#[derive(Debug, Default)]
pub struct TranscriptAvatar {
    initialized: AtomicBool,
    spoken: Mutex<Vec<String>>,
    cancels: AtomicUsize,
}

impl TranscriptAvatar {
    /// Create an empty transcript
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything spoken so far, oldest first
    #[must_use]
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }

    /// Number of interruptions
    #[must_use]
    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::Relaxed)
    }

    /// Whether `initialize` has run
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AvatarHandle for TranscriptAvatar {
    async fn initialize(&self) -> Result<(), AvatarError> {
        self.initialized.store(true, Ordering::Relaxed);
        tracing::debug!("Transcript avatar ready");
        Ok(())
    }

    async fn speak(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        tracing::info!(text = %text, "Avatar speaks");
        self.spoken.lock().push(text.to_string());
    }

    async fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Avatar interrupted");
    }
}

/// Drives an [`AvatarHandle`] from chat events
pub struct AvatarDriver {
    avatar: Arc<dyn AvatarHandle>,
    /// A reply was handed to the avatar and not interrupted since
    speaking: bool,
}

impl AvatarDriver {
    /// Wrap an avatar
    pub fn new(avatar: Arc<dyn AvatarHandle>) -> Self {
        Self {
            avatar,
            speaking: false,
        }
    }

    /// Initialize the underlying avatar
    pub async fn initialize(&self) -> Result<(), AvatarError> {
        self.avatar.initialize().await
    }

    /// React to one chat event
    pub async fn handle(&mut self, event: &ChatEvent) {
        match event {
            ChatEvent::Loading(true) if self.speaking => {
                self.avatar.cancel().await;
                self.speaking = false;
            }
            ChatEvent::TurnCompleted(message) if !message.content.trim().is_empty() => {
                self.avatar.speak(&message.content).await;
                self.speaking = true;
            }
            _ => {}
        }
    }
}
