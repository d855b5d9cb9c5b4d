//! Line-mode rendering of chat events
//!
//! Deltas carry the full accumulated reply, so the renderer remembers how
//! much of the in-flight message it already wrote and prints only the new
//! suffix. Everything here is pure; `main` does the actual writing.

use parley_core::streaming::{APOLOGY_TEXT, CANCELLED_TEXT};
use parley_core::{ChatEvent, MessageId, NotifyLevel};

/// Prefix written before each assistant reply
pub const REPLY_PREFIX: &str = "parley> ";

/// Text destined for one of the standard streams
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Output {
    /// Conversation text
    Stdout(String),
    /// Notifications
    Stderr(String),
}

/// Tracks the reply currently being written
#[derive(Debug, Default)]
pub struct Display {
    current: Option<MessageId>,
    printed: usize,
}

impl Display {
    /// Create an idle display
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn one event into terminal output
    pub fn render(&mut self, event: &ChatEvent) -> Vec<Output> {
        match event {
            ChatEvent::Loading(_) => Vec::new(),
            ChatEvent::Delta { id, content } => self.delta(id, content),
            ChatEvent::TurnCompleted(message) => {
                let mut out = self.delta(&message.id, &message.content);
                out.push(Output::Stdout("\n".to_string()));
                self.reset();
                out
            }
            ChatEvent::TurnCancelled { .. } => {
                let text = if self.printed > 0 {
                    format!(" [{CANCELLED_TEXT}]\n")
                } else {
                    format!("{REPLY_PREFIX}{CANCELLED_TEXT}\n")
                };
                self.reset();
                vec![Output::Stdout(text)]
            }
            ChatEvent::Toast {
                level,
                title,
                description,
            } => {
                let mut out = Vec::new();
                if self.printed > 0 {
                    out.push(Output::Stdout("\n".to_string()));
                }
                out.push(Output::Stderr(format!(
                    "[{}] {title}: {description}\n",
                    level_tag(*level)
                )));
                // A failed turn leaves an apology in place of the reply
                if *level == NotifyLevel::Error {
                    out.push(Output::Stdout(format!("{REPLY_PREFIX}{APOLOGY_TEXT}\n")));
                }
                self.reset();
                out
            }
        }
    }

    fn delta(&mut self, id: &MessageId, content: &str) -> Vec<Output> {
        let mut text = String::new();
        if self.current.as_ref() != Some(id) {
            self.current = Some(id.clone());
            self.printed = 0;
        }
        if self.printed == 0 && !content.is_empty() {
            text.push_str(REPLY_PREFIX);
        }
        // Content only ever grows; anything else gets reprinted whole
        let fresh = content.get(self.printed..).unwrap_or(content);
        text.push_str(fresh);
        self.printed = content.len();

        if text.is_empty() {
            Vec::new()
        } else {
            vec![Output::Stdout(text)]
        }
    }

    fn reset(&mut self) {
        self.current = None;
        self.printed = 0;
    }
}

fn level_tag(level: NotifyLevel) -> &'static str {
    match level {
        NotifyLevel::Info => "info",
        NotifyLevel::Warning => "warn",
        NotifyLevel::Error => "error",
    }
}
