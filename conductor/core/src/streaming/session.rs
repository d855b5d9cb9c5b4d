//! Chat Session
//!
//! Client-side owner of one conversation: the shared message list, the
//! single in-flight turn, and its cancellation.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::consumer::{emit, StreamConsumer, TurnOutcome};
use crate::messages::{ChatEvent, MessageId, ThreadId};
use crate::protocol::{TurnRequest, DEFAULT_SUMMARY_LENGTH};
use crate::session::{Message, MessageList, MessageListError, SharedMessageList};
use crate::transport::TurnTransport;

/// Content the placeholder is left with when the user stops a turn
pub const CANCELLED_TEXT: &str = "Cancelled.";

/// Assistant message shown in place of a failed reply
pub const APOLOGY_TEXT: &str =
    "I'm sorry, I encountered an error while processing your request. Please try again later.";

/// Where the current (or last) turn is
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TurnPhase {
    /// No turn has run yet
    #[default]
    Idle,
    /// Request sent, waiting for the endpoint to answer
    Submitted,
    /// Reply bytes are arriving
    Streaming,
    /// Last turn streamed to the end
    Completed,
    /// Last turn was stopped by the user
    Cancelled,
    /// Last turn failed
    Failed,
}

impl TurnPhase {
    /// Whether a turn is in flight
    #[must_use]
    pub fn is_loading(self) -> bool {
        matches!(self, Self::Submitted | Self::Streaming)
    }
}

/// Why a turn was not started
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TurnRejected {
    /// Another turn is still in flight
    #[error("a turn is already in progress")]
    Busy,

    /// Nothing to send
    #[error("message is empty")]
    EmptyInput,

    /// The message list refused the new messages
    #[error(transparent)]
    History(#[from] MessageListError),
}

/// Optional tuning fields sent with each turn
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TurnOptions {
    /// Retrieval vector ratio
    pub vector_ratio: Option<f32>,
    /// Summary length hint (`"none"` when unset)
    pub summary_length: Option<String>,
}

/// One conversation against a turn endpoint
///
/// At most one turn is in flight; [`send_turn`](Self::send_turn) rejects a
/// second one with [`TurnRejected::Busy`] instead of queueing it.
pub struct ChatSession<T: TurnTransport + ?Sized> {
    transport: Arc<T>,
    messages: SharedMessageList,
    events: mpsc::Sender<ChatEvent>,
    options: TurnOptions,
    /// Held for the whole turn
    turn_lock: tokio::sync::Mutex<()>,
    /// Cancellation for the live turn, if any
    abort: parking_lot::Mutex<Option<CancellationToken>>,
    phase: watch::Sender<TurnPhase>,
    thread_id: parking_lot::Mutex<Option<ThreadId>>,
}

impl<T: TurnTransport + ?Sized> ChatSession<T> {
    /// Create a session with an empty message list
    pub fn new(transport: Arc<T>, events: mpsc::Sender<ChatEvent>) -> Self {
        Self::with_messages(transport, MessageList::shared(), events)
    }

    /// Create a session over an existing shared message list
    pub fn with_messages(
        transport: Arc<T>,
        messages: SharedMessageList,
        events: mpsc::Sender<ChatEvent>,
    ) -> Self {
        let (phase, _) = watch::channel(TurnPhase::Idle);
        Self {
            transport,
            messages,
            events,
            options: TurnOptions::default(),
            turn_lock: tokio::sync::Mutex::new(()),
            abort: parking_lot::Mutex::new(None),
            phase,
            thread_id: parking_lot::Mutex::new(None),
        }
    }

    /// Set the tuning fields sent with each turn
    #[must_use]
    pub fn with_options(mut self, options: TurnOptions) -> Self {
        self.options = options;
        self
    }

    /// Shared conversation state
    #[must_use]
    pub fn messages(&self) -> SharedMessageList {
        Arc::clone(&self.messages)
    }

    /// Current turn phase
    #[must_use]
    pub fn phase(&self) -> TurnPhase {
        *self.phase.borrow()
    }

    /// Watch turn phase changes
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<TurnPhase> {
        self.phase.subscribe()
    }

    /// Whether a turn is in flight
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.phase().is_loading()
    }

    /// Backend thread this conversation continues on
    #[must_use]
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.thread_id.lock().clone()
    }

    /// Send a user message and stream the assistant's reply
    ///
    /// Resolves when the turn has settled. Cancellation and failure are
    /// outcomes, not errors; `Err` means the turn never started.
    pub async fn send_turn(&self, content: impl Into<String>) -> Result<TurnOutcome, TurnRejected> {
        let content = content.into();
        let _turn = self.turn_lock.try_lock().map_err(|_| TurnRejected::Busy)?;
        if content.trim().is_empty() {
            return Err(TurnRejected::EmptyInput);
        }

        let user = Message::user(content);
        let placeholder = Message::placeholder();
        let placeholder_id = placeholder.id.clone();
        let history = {
            let mut list = self.messages.write();
            let user_id = user.id.clone();
            list.append(user)?;
            let history = list.snapshot();
            if let Err(e) = list.append(placeholder) {
                list.remove(&user_id);
                return Err(e.into());
            }
            history
        };

        let cancel = CancellationToken::new();
        *self.abort.lock() = Some(cancel.clone());
        self.phase.send_replace(TurnPhase::Submitted);
        let mut guard = TurnGuard {
            abort: &self.abort,
            phase: &self.phase,
            messages: &self.messages,
            events: &self.events,
            placeholder: placeholder_id.clone(),
            settled: false,
            loading_cleared: false,
        };
        emit(&self.events, ChatEvent::Loading(true), &cancel).await;

        let request = TurnRequest {
            messages: history,
            vector_ratio: self.options.vector_ratio,
            summary_length: Some(
                self.options
                    .summary_length
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SUMMARY_LENGTH.to_string()),
            ),
            thread_id: self.thread_id(),
        };
        tracing::debug!(
            history = request.messages.len(),
            thread_id = ?request.thread_id,
            "Submitting turn"
        );

        let mut consumer =
            StreamConsumer::new(&self.messages, &self.events, &self.phase, placeholder_id);
        let outcome = consumer.run(self.transport.as_ref(), &request, &cancel).await;

        if let Some(thread_id) = consumer.thread_id() {
            *self.thread_id.lock() = Some(thread_id.clone());
        }

        guard.settle(match &outcome {
            TurnOutcome::Completed(_) => TurnPhase::Completed,
            TurnOutcome::Cancelled => TurnPhase::Cancelled,
            TurnOutcome::Failed(_) => TurnPhase::Failed,
        });
        emit(&self.events, ChatEvent::Loading(false), &cancel).await;
        guard.loading_cleared = true;

        Ok(outcome)
    }

    /// Cancel the in-flight turn
    ///
    /// Returns whether there was a turn to cancel.
    pub fn stop(&self) -> bool {
        match self.abort.lock().as_ref() {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                true
            }
            _ => false,
        }
    }
}

/// Settles the session when a turn ends, including when the caller drops
/// the `send_turn` future mid-turn
struct TurnGuard<'a> {
    abort: &'a parking_lot::Mutex<Option<CancellationToken>>,
    phase: &'a watch::Sender<TurnPhase>,
    messages: &'a SharedMessageList,
    events: &'a mpsc::Sender<ChatEvent>,
    placeholder: MessageId,
    /// The consumer produced an outcome and the phase reflects it
    settled: bool,
    /// `Loading(false)` was published
    loading_cleared: bool,
}

impl TurnGuard<'_> {
    fn settle(&mut self, phase: TurnPhase) {
        self.phase.send_replace(phase);
        self.settled = true;
    }

    fn publish(&self, event: ChatEvent) {
        if self.events.try_send(event).is_err() {
            tracing::debug!("Could not publish event for abandoned turn");
        }
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.abort.lock().take() {
            token.cancel();
        }

        if !self.settled {
            tracing::info!(id = %self.placeholder, "Turn dropped before settling");
            self.messages.write().patch(&self.placeholder, CANCELLED_TEXT);
            self.phase.send_replace(TurnPhase::Cancelled);
            self.publish(ChatEvent::TurnCancelled {
                id: self.placeholder.clone(),
            });
        }
        if !self.loading_cleared {
            self.publish(ChatEvent::Loading(false));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{MessageRole, NotifyLevel};
    use crate::test_utils::ScriptedTransport;
    use crate::transport::TurnError;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn session(
        transport: ScriptedTransport,
    ) -> (Arc<ChatSession<ScriptedTransport>>, mpsc::Receiver<ChatEvent>, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let (tx, rx) = mpsc::channel(64);
        (
            Arc::new(ChatSession::new(Arc::clone(&transport), tx)),
            rx,
            transport,
        )
    }

    fn drain(rx: &mut mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_completed_turn_concatenates_chunks() {
        let (session, mut rx, transport) =
            session(ScriptedTransport::new().with_chunks(["Hel", "lo!"]));

        let outcome = session.send_turn("Hi").await.unwrap();

        let messages = session.messages().read().snapshot();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].content, "Hi");
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].content, "Hello!");
        assert_ne!(messages[0].id, messages[1].id);
        assert_eq!(outcome, TurnOutcome::Completed(messages[1].clone()));

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                ChatEvent::Loading(true),
                ChatEvent::Delta {
                    id: messages[1].id.clone(),
                    content: "Hel".to_string(),
                },
                ChatEvent::Delta {
                    id: messages[1].id.clone(),
                    content: "Hello!".to_string(),
                },
                ChatEvent::TurnCompleted(messages[1].clone()),
                ChatEvent::Loading(false),
            ]
        );

        // History sent excludes the placeholder
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages, vec![messages[0].clone()]);
        assert_eq!(requests[0].summary_length.as_deref(), Some("none"));
        assert_eq!(session.phase(), TurnPhase::Completed);
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let (session, mut rx, transport) = session(ScriptedTransport::new());

        assert_eq!(session.send_turn("   \n").await, Err(TurnRejected::EmptyInput));
        assert!(session.messages().read().is_empty());
        assert!(transport.requests().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_busy_while_streaming() {
        let (session, mut rx, _transport) =
            session(ScriptedTransport::new().with_chunks(["Hel", "lo!"]).hang_after(1));

        let running = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.send_turn("first").await }
        });

        // Wait until the first chunk has landed
        loop {
            match rx.recv().await {
                Some(ChatEvent::Delta { .. }) => break,
                Some(_) => {}
                None => panic!("event channel closed"),
            }
        }
        assert!(session.is_loading());

        let before = session.messages().read().snapshot();
        assert_eq!(session.send_turn("second").await, Err(TurnRejected::Busy));
        assert_eq!(session.messages().read().snapshot(), before);

        assert!(session.stop());
        assert_eq!(running.await.unwrap(), Ok(TurnOutcome::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_leaves_marker() {
        let (session, mut rx, _transport) =
            session(ScriptedTransport::new().with_chunks(["Hel", "lo!"]).hang_after(1));

        let running = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.send_turn("Hi").await }
        });

        let placeholder = loop {
            match rx.recv().await {
                Some(ChatEvent::Delta { id, content }) => {
                    assert_eq!(content, "Hel");
                    break id;
                }
                Some(_) => {}
                None => panic!("event channel closed"),
            }
        };

        assert!(session.stop());
        assert_eq!(running.await.unwrap(), Ok(TurnOutcome::Cancelled));

        let messages = session.messages().read().snapshot();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].id, placeholder);
        assert_eq!(messages[1].content, CANCELLED_TEXT);
        assert_eq!(session.phase(), TurnPhase::Cancelled);

        let rest = drain(&mut rx);
        assert_eq!(
            rest,
            vec![
                ChatEvent::TurnCancelled { id: placeholder },
                ChatEvent::Loading(false),
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_while_event_channel_is_full() {
        let transport = Arc::new(ScriptedTransport::new().with_chunks(["a", "b", "c", "d"]));
        // Room for Loading(true) and one delta; nobody reads
        let (tx, _rx) = mpsc::channel(2);
        let session = Arc::new(ChatSession::new(Arc::clone(&transport), tx));
        let mut phase = session.subscribe_phase();

        let running = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.send_turn("Hi").await }
        });
        phase
            .wait_for(|p| *p == TurnPhase::Streaming)
            .await
            .unwrap();

        assert!(session.stop());
        let outcome = tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .expect("stop did not unblock the turn")
            .unwrap();
        assert_eq!(outcome, Ok(TurnOutcome::Cancelled));

        let messages = session.messages().read().snapshot();
        assert_eq!(messages[1].content, CANCELLED_TEXT);
        assert_eq!(session.phase(), TurnPhase::Cancelled);
        assert!(!session.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_turn_settles_session() {
        let (session, mut rx, transport) =
            session(ScriptedTransport::new().with_chunks(["Hel", "lo!"]).hang_after(1));

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), session.send_turn("Hi")).await;
        assert!(abandoned.is_err());

        assert!(!session.is_loading());
        assert_eq!(session.phase(), TurnPhase::Cancelled);
        assert!(!session.stop());

        let messages = session.messages().read().snapshot();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, CANCELLED_TEXT);

        let events = drain(&mut rx);
        assert_eq!(
            &events[events.len() - 2..],
            &[
                ChatEvent::TurnCancelled {
                    id: messages[1].id.clone()
                },
                ChatEvent::Loading(false),
            ]
        );

        // The session takes the next turn
        let next = tokio::time::timeout(Duration::from_millis(50), session.send_turn("again")).await;
        assert!(next.is_err(), "second turn returned early: {next:?}");
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let (session, _rx, _transport) = session(ScriptedTransport::new());
        assert!(!session.stop());
        assert_eq!(session.phase(), TurnPhase::Idle);
    }

    #[tokio::test]
    async fn test_rejected_turn_replaces_placeholder_with_apology() {
        let (session, mut rx, _transport) = session(ScriptedTransport::new().rejecting(
            TurnError::Rejected {
                status: 502,
                detail: "Run ended with status: failed".to_string(),
            },
        ));

        let outcome = session.send_turn("Hi").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Failed(TurnError::Rejected { status: 502, .. })));

        let messages = session.messages().read().snapshot();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Hi");
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].content, APOLOGY_TEXT);

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                ChatEvent::Loading(true),
                ChatEvent::Toast {
                    level: NotifyLevel::Error,
                    title: "Error".to_string(),
                    description: "Run ended with status: failed".to_string(),
                },
                ChatEvent::Loading(false),
            ]
        );
        assert_eq!(session.phase(), TurnPhase::Failed);
    }

    #[tokio::test]
    async fn test_network_failure_mid_stream() {
        let (session, _rx, _transport) = session(
            ScriptedTransport::new()
                .with_chunks(["Hel", "lo!"])
                .failing_after(1, TurnError::Network("connection reset".to_string())),
        );

        let outcome = session.send_turn("Hi").await.unwrap();
        assert_eq!(
            outcome,
            TurnOutcome::Failed(TurnError::Network("connection reset".to_string()))
        );

        let messages = session.messages().read().snapshot();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, APOLOGY_TEXT);
    }

    #[tokio::test]
    async fn test_multibyte_split_across_chunks() {
        let bytes = "¡hola, 世界!".as_bytes().to_vec();
        let (session, _rx, _transport) = session(
            ScriptedTransport::new()
                .with_byte_chunks(vec![bytes[..1].to_vec(), bytes[1..9].to_vec(), bytes[9..].to_vec()]),
        );

        let outcome = session.send_turn("Hi").await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(session.messages().read().snapshot()[1].content, "¡hola, 世界!");
    }

    #[tokio::test]
    async fn test_invalid_utf8_fails_turn() {
        let (session, _rx, _transport) = session(
            ScriptedTransport::new().with_byte_chunks(vec![b"ok".to_vec(), vec![0xFF]]),
        );

        let outcome = session.send_turn("Hi").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Failed(TurnError::Decode(_))));
    }

    #[tokio::test]
    async fn test_thread_id_is_sent_back_on_next_turn() {
        let (session, _rx, transport) = session(
            ScriptedTransport::new()
                .with_chunks(["ok"])
                .with_thread_id("thread_42"),
        );

        session.send_turn("one").await.unwrap();
        assert_eq!(session.thread_id(), Some(ThreadId::from("thread_42")));
        session.send_turn("two").await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].thread_id, None);
        assert_eq!(requests[1].thread_id, Some(ThreadId::from("thread_42")));
        // Second turn carries the full history, placeholder excluded
        assert_eq!(requests[1].messages.len(), 3);
        assert_eq!(session.messages().read().len(), 4);
    }

    #[tokio::test]
    async fn test_options_are_forwarded() {
        let transport = Arc::new(ScriptedTransport::new().with_chunks(["ok"]));
        let (tx, _rx) = mpsc::channel(64);
        let session = ChatSession::new(Arc::clone(&transport), tx).with_options(TurnOptions {
            vector_ratio: Some(0.3),
            summary_length: Some("short".to_string()),
        });

        session.send_turn("Hi").await.unwrap();

        let request = &transport.requests()[0];
        assert_eq!(request.vector_ratio, Some(0.3));
        assert_eq!(request.summary_length.as_deref(), Some("short"));
    }
}
