//! Integration tests for the HTTP turn transport and chat session
//!
//! A local axum server plays the turn submission endpoint so streamed bodies,
//! response headers and error bodies go through a real HTTP stack.
//!
//! # Test Coverage
//!
//! - Chunked reply accumulated into the placeholder
//! - Thread id header remembered and sent back
//! - Multi-byte characters split across body chunks
//! - Cancellation while the body is still open
//! - Error bodies turned into a toast and an apology message

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use parley_core::streaming::{APOLOGY_TEXT, CANCELLED_TEXT};
use parley_core::{
    ChatEvent, ChatSession, ErrorBody, HttpTurnTransport, NotifyLevel, ThreadId, TurnError,
    TurnOutcome, TurnRequest, THREAD_HEADER,
};

async fn spawn_endpoint(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api/chat")
}

fn streamed(chunks: Vec<Vec<u8>>, thread: &'static str) -> Response {
    let body = futures::stream::iter(chunks.into_iter().map(Ok::<_, Infallible>));
    Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(THREAD_HEADER, thread)
        .body(Body::from_stream(body))
        .unwrap()
}

fn session(endpoint: &str) -> (Arc<ChatSession<HttpTurnTransport>>, mpsc::Receiver<ChatEvent>) {
    let transport = Arc::new(HttpTurnTransport::new(endpoint).unwrap());
    let (tx, rx) = mpsc::channel(256);
    (Arc::new(ChatSession::new(transport, tx)), rx)
}

#[tokio::test]
async fn test_streamed_reply_and_thread_reuse() {
    let seen: Arc<Mutex<Vec<TurnRequest>>> = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().route(
        "/api/chat",
        post({
            let seen = Arc::clone(&seen);
            move |Json(request): Json<TurnRequest>| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().push(request);
                    streamed(vec![b"Hel".to_vec(), b"lo!".to_vec()], "thread_9")
                }
            }
        }),
    );
    let endpoint = spawn_endpoint(app).await;
    let (session, _rx) = session(&endpoint);

    let outcome = session.send_turn("Hi").await.unwrap();
    assert!(outcome.is_completed());
    assert_eq!(session.messages().read().snapshot()[1].content, "Hello!");
    assert_eq!(session.thread_id(), Some(ThreadId::from("thread_9")));

    session.send_turn("Again").await.unwrap();

    let requests = seen.lock().clone();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].thread_id, None);
    assert_eq!(requests[0].summary_length.as_deref(), Some("none"));
    assert_eq!(requests[1].thread_id, Some(ThreadId::from("thread_9")));
    assert_eq!(requests[1].messages.len(), 3);
}

#[tokio::test]
async fn test_multibyte_split_over_http() {
    let text = "héllo wörld 🦙";
    let bytes = text.as_bytes().to_vec();
    let app = Router::new().route(
        "/api/chat",
        post(move || {
            let bytes = bytes.clone();
            async move {
                let chunks = vec![bytes[..2].to_vec(), bytes[2..14].to_vec(), bytes[14..].to_vec()];
                streamed(chunks, "thread_1")
            }
        }),
    );
    let endpoint = spawn_endpoint(app).await;
    let (session, _rx) = session(&endpoint);

    session.send_turn("Hi").await.unwrap();
    assert_eq!(session.messages().read().snapshot()[1].content, text);
}

#[tokio::test]
async fn test_cancel_while_body_open() {
    let app = Router::new().route(
        "/api/chat",
        post(|| async {
            let body = futures::stream::iter(vec![Ok::<_, Infallible>(b"Hel".to_vec())])
                .chain(futures::stream::pending());
            Response::builder()
                .header(THREAD_HEADER, "thread_1")
                .body(Body::from_stream(body))
                .unwrap()
        }),
    );
    let endpoint = spawn_endpoint(app).await;
    let (session, mut rx) = session(&endpoint);

    let running = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.send_turn("Hi").await }
    });

    loop {
        match rx.recv().await {
            Some(ChatEvent::Delta { content, .. }) => {
                assert_eq!(content, "Hel");
                break;
            }
            Some(_) => {}
            None => panic!("event channel closed"),
        }
    }

    assert!(session.stop());
    assert_eq!(running.await.unwrap(), Ok(TurnOutcome::Cancelled));
    assert_eq!(session.messages().read().snapshot()[1].content, CANCELLED_TEXT);
}

#[tokio::test]
async fn test_error_body_becomes_toast() {
    let app = Router::new().route(
        "/api/chat",
        post(|| async {
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorBody::new(
                    "Failed to process chat",
                    Some("Run ended with status: expired".to_string()),
                )),
            )
                .into_response()
        }),
    );
    let endpoint = spawn_endpoint(app).await;
    let (session, mut rx) = session(&endpoint);

    let outcome = session.send_turn("Hi").await.unwrap();
    assert_eq!(
        outcome,
        TurnOutcome::Failed(TurnError::Rejected {
            status: 502,
            detail: "Run ended with status: expired".to_string(),
        })
    );

    let messages = session.messages().read().snapshot();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, APOLOGY_TEXT);

    let mut toast = None;
    while let Ok(event) = rx.try_recv() {
        if let ChatEvent::Toast { level, title, description } = event {
            toast = Some((level, title, description));
        }
    }
    assert_eq!(
        toast,
        Some((
            NotifyLevel::Error,
            "Error".to_string(),
            "Run ended with status: expired".to_string()
        ))
    );
}

#[tokio::test]
async fn test_bare_status_error() {
    let app = Router::new().route("/api/chat", post(|| async { StatusCode::SERVICE_UNAVAILABLE }));
    let endpoint = spawn_endpoint(app).await;
    let (session, _rx) = session(&endpoint);

    let outcome = session.send_turn("Hi").await.unwrap();
    assert_eq!(
        outcome,
        TurnOutcome::Failed(TurnError::Rejected {
            status: 503,
            detail: "Error: 503".to_string(),
        })
    );
}
