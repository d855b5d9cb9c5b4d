//! Stream Consumer
//!
//! Reads one turn's reply stream into the assistant placeholder and settles
//! the placeholder once the stream ends, fails, or is cancelled.

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::decoder::{DecodeError, Utf8StreamDecoder};
use super::session::{TurnPhase, APOLOGY_TEXT, CANCELLED_TEXT};
use crate::messages::{ChatEvent, MessageId, NotifyLevel, ThreadId};
use crate::protocol::TurnRequest;
use crate::session::{Message, SharedMessageList};
use crate::transport::{TurnError, TurnTransport};

/// How a turn ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The reply streamed to the end; carries the final assistant message
    Completed(Message),
    /// The user stopped the turn; the placeholder reads "Cancelled."
    Cancelled,
    /// The turn failed; the placeholder was replaced by an apology
    Failed(TurnError),
}

impl TurnOutcome {
    /// Whether the reply arrived in full
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Why streaming stopped early
enum Interrupted {
    Cancelled,
    Failed(TurnError),
}

impl From<TurnError> for Interrupted {
    fn from(err: TurnError) -> Self {
        Self::Failed(err)
    }
}

impl From<DecodeError> for Interrupted {
    fn from(err: DecodeError) -> Self {
        Self::Failed(TurnError::Decode(err.to_string()))
    }
}

/// Streams one turn's reply into the shared message list
pub(crate) struct StreamConsumer<'a> {
    messages: &'a SharedMessageList,
    events: &'a mpsc::Sender<ChatEvent>,
    phase: &'a watch::Sender<TurnPhase>,
    placeholder: MessageId,
    thread_id: Option<ThreadId>,
}

impl<'a> StreamConsumer<'a> {
    pub(crate) fn new(
        messages: &'a SharedMessageList,
        events: &'a mpsc::Sender<ChatEvent>,
        phase: &'a watch::Sender<TurnPhase>,
        placeholder: MessageId,
    ) -> Self {
        Self {
            messages,
            events,
            phase,
            placeholder,
            thread_id: None,
        }
    }

    /// Thread id reported by the endpoint, if the turn got that far
    pub(crate) fn thread_id(&self) -> Option<&ThreadId> {
        self.thread_id.as_ref()
    }

    /// Open the turn, stream the reply, and settle the placeholder
    pub(crate) async fn run<T: TurnTransport + ?Sized>(
        &mut self,
        transport: &T,
        request: &TurnRequest,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        match self.stream_reply(transport, request, cancel).await {
            Ok(()) => self.complete(cancel).await,
            Err(Interrupted::Cancelled) => self.cancelled(cancel).await,
            Err(Interrupted::Failed(err)) => self.failed(err, cancel).await,
        }
    }

    async fn stream_reply<T: TurnTransport + ?Sized>(
        &mut self,
        transport: &T,
        request: &TurnRequest,
        cancel: &CancellationToken,
    ) -> Result<(), Interrupted> {
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Interrupted::Cancelled),
            opened = transport.open(request) => opened?,
        };

        self.thread_id = response.thread_id;
        self.phase.send_replace(TurnPhase::Streaming);

        let mut body = response.body;
        let mut decoder = Utf8StreamDecoder::new();
        let mut accumulated = String::new();

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Interrupted::Cancelled),
                next = body.next() => next,
            };

            let Some(chunk) = next else { break };
            let text = decoder.decode(&chunk?)?;
            if text.is_empty() {
                continue;
            }

            accumulated.push_str(&text);
            self.messages
                .write()
                .patch(&self.placeholder, accumulated.as_str());
            emit(
                self.events,
                ChatEvent::Delta {
                    id: self.placeholder.clone(),
                    content: accumulated.clone(),
                },
                cancel,
            )
            .await;
        }

        decoder.finish()?;
        Ok(())
    }

    async fn complete(&self, cancel: &CancellationToken) -> TurnOutcome {
        let message = self.messages.read().get(&self.placeholder).cloned();
        match message {
            Some(message) => {
                tracing::debug!(id = %message.id, chars = message.content.len(), "Turn completed");
                emit(self.events, ChatEvent::TurnCompleted(message.clone()), cancel).await;
                TurnOutcome::Completed(message)
            }
            None => {
                // Someone removed the placeholder under us
                let err = TurnError::Decode("assistant placeholder disappeared".to_string());
                tracing::error!(id = %self.placeholder, "Placeholder missing at end of stream");
                TurnOutcome::Failed(err)
            }
        }
    }

    async fn cancelled(&self, cancel: &CancellationToken) -> TurnOutcome {
        self.messages.write().patch(&self.placeholder, CANCELLED_TEXT);
        tracing::info!(id = %self.placeholder, "Turn cancelled");
        emit(
            self.events,
            ChatEvent::TurnCancelled {
                id: self.placeholder.clone(),
            },
            cancel,
        )
        .await;
        TurnOutcome::Cancelled
    }

    async fn failed(&self, err: TurnError, cancel: &CancellationToken) -> TurnOutcome {
        tracing::warn!(error = %err, "Turn failed");
        {
            let mut list = self.messages.write();
            list.remove(&self.placeholder);
            if let Err(e) = list.append(Message::assistant(APOLOGY_TEXT)) {
                tracing::error!(error = %e, "Could not append apology message");
            }
        }
        emit(
            self.events,
            ChatEvent::Toast {
                level: NotifyLevel::Error,
                title: "Error".to_string(),
                description: err.to_string(),
            },
            cancel,
        )
        .await;
        TurnOutcome::Failed(err)
    }
}

/// Publish `event`, giving up once the turn is cancelled
///
/// A surface that stops draining its channel must not keep a stopped turn
/// from settling. After cancellation, events that do not fit in the channel
/// are dropped.
pub(super) async fn emit(
    events: &mpsc::Sender<ChatEvent>,
    event: ChatEvent,
    cancel: &CancellationToken,
) {
    tokio::select! {
        biased;
        sent = events.send(event) => {
            if sent.is_err() {
                tracing::trace!("No surface listening for chat events");
            }
        }
        () = cancel.cancelled() => {
            tracing::debug!("Event channel full after cancellation; event dropped");
        }
    }
}
