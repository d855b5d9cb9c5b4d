//! Message List Model
//!
//! The ordered conversation state shared by the stream consumer and every
//! surface. Insertion order is turn order; the whole list is the context
//! sent with the next turn.
//!
//! # Design Philosophy
//!
//! The list is a plain state container: append, patch, replace, remove.
//! It does not know about turns. Mutual exclusion between turns lives in
//! [`ChatSession`](crate::streaming::ChatSession), which holds a single-slot
//! turn lock while it writes here.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messages::{MessageId, MessageRole};

/// A message in the conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub role: MessageRole,
    /// Message content
    pub content: String,
}

impl Message {
    /// Create a new message with a fresh id
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Create an empty assistant placeholder (content will be patched)
    #[must_use]
    pub fn placeholder() -> Self {
        Self::new(MessageRole::Assistant, String::new())
    }
}

/// Errors from message list mutations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageListError {
    /// An id is already present; ids are never reused
    #[error("message id {0} is already in the list")]
    DuplicateMessageId(MessageId),
}

/// Ordered, append/patch-oriented conversation state
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MessageList {
    messages: Vec<Message>,
}

/// Message list shared between a session and its surfaces
pub type SharedMessageList = Arc<RwLock<MessageList>>;

impl MessageList {
    /// Create an empty list
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a new empty list for sharing
    #[must_use]
    pub fn shared() -> SharedMessageList {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Append a message at the end
    pub fn append(&mut self, message: Message) -> Result<(), MessageListError> {
        if self.get(&message.id).is_some() {
            return Err(MessageListError::DuplicateMessageId(message.id));
        }
        self.messages.push(message);
        Ok(())
    }

    /// Overwrite the content of the message with `id`
    ///
    /// Returns false if no such message exists.
    pub fn patch(&mut self, id: &MessageId, content: impl Into<String>) -> bool {
        match self.messages.iter_mut().find(|m| &m.id == id) {
            Some(msg) => {
                msg.content = content.into();
                true
            }
            None => false,
        }
    }

    /// Replace the message with `id` wholesale, keeping its position
    ///
    /// Returns false if no such message exists, or if the replacement carries
    /// an id already used by a different message.
    pub fn replace(&mut self, id: &MessageId, message: Message) -> bool {
        if &message.id != id && self.get(&message.id).is_some() {
            return false;
        }
        match self.messages.iter_mut().find(|m| &m.id == id) {
            Some(slot) => {
                *slot = message;
                true
            }
            None => false,
        }
    }

    /// Remove the message with `id`
    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let idx = self.messages.iter().position(|m| &m.id == id)?;
        Some(self.messages.remove(idx))
    }

    /// Get message by ID
    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// The most recent user message
    #[must_use]
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == MessageRole::User)
    }

    /// Iterate in turn order
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// All messages as a slice
    #[must_use]
    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    /// Owned copy of the current history
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Number of messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the list is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Clear message history
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// Latest user message in a history slice
#[must_use]
pub fn last_user_message(history: &[Message]) -> Option<&Message> {
    history.iter().rev().find(|m| m.role == MessageRole::User)
}
