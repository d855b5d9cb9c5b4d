//! OpenAI Assistants Backend
//!
//! Run backend for the OpenAI Assistants API (v2).
//!
//! # Assistants API
//!
//! - `POST /threads` - Create a thread
//! - `GET /threads/{thread}` - Retrieve a thread
//! - `POST /threads/{thread}/messages` - Append a message
//! - `GET /threads/{thread}/messages` - List messages (newest first)
//! - `POST /threads/{thread}/runs` - Start a run
//! - `GET /threads/{thread}/runs/{run}` - Poll a run
//! - `POST /threads/{thread}/runs/{run}/cancel` - Cancel a run

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::traits::{BackendError, Run, RunBackend, ThreadMessage};
use crate::messages::{RunId, ThreadId};

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Beta header value required by the Assistants endpoints
const ASSISTANTS_BETA: &str = "assistants=v2";

/// Per-request timeout; individual status reads are short, the run itself is polled
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct ThreadObject {
    id: ThreadId,
}

#[derive(Deserialize)]
struct MessageListObject {
    #[serde(default)]
    data: Vec<ThreadMessage>,
}

#[derive(Deserialize)]
struct VendorErrorBody {
    error: VendorError,
}

#[derive(Deserialize)]
struct VendorError {
    message: String,
}

/// OpenAI Assistants client
#[derive(Clone)]
pub struct OpenAiAssistants {
    /// API key sent as a bearer token
    api_key: String,
    /// Base URL without trailing slash
    base_url: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiAssistants {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAssistants")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAiAssistants {
    /// Create a new client
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, BackendError> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// Get the base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", ASSISTANTS_BETA)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let response = self
            .authorized(self.http_client.get(self.url(path)))
            .send()
            .await?;
        decode(response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, BackendError> {
        let response = self
            .authorized(self.http_client.post(self.url(path)))
            .json(body)
            .send()
            .await?;
        decode(response).await
    }
}

/// Turn a response into `T`, translating vendor error bodies
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(http_error(status.as_u16(), &body));
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))
}

/// Build an [`BackendError::Http`] from a vendor error body
fn http_error(status: u16, body: &str) -> BackendError {
    let message = serde_json::from_str::<VendorErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string());
    BackendError::Http { status, message }
}

#[async_trait]
impl RunBackend for OpenAiAssistants {
    fn name(&self) -> &'static str {
        "OpenAI Assistants"
    }

    async fn health_check(&self) -> bool {
        self.authorized(self.http_client.get(self.url("/models")))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }

    async fn create_thread(&self) -> Result<ThreadId, BackendError> {
        let thread: ThreadObject = self.post_json("/threads", &serde_json::json!({})).await?;
        Ok(thread.id)
    }

    async fn retrieve_thread(&self, thread_id: &ThreadId) -> Result<ThreadId, BackendError> {
        let thread: ThreadObject = self.get_json(&format!("/threads/{thread_id}")).await?;
        Ok(thread.id)
    }

    async fn append_user_message(
        &self,
        thread_id: &ThreadId,
        content: &str,
    ) -> Result<(), BackendError> {
        let _: serde_json::Value = self
            .post_json(
                &format!("/threads/{thread_id}/messages"),
                &serde_json::json!({
                    "role": "user",
                    "content": content,
                }),
            )
            .await?;
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &ThreadId,
        assistant_id: &str,
    ) -> Result<Run, BackendError> {
        self.post_json(
            &format!("/threads/{thread_id}/runs"),
            &serde_json::json!({ "assistant_id": assistant_id }),
        )
        .await
    }

    async fn retrieve_run(&self, thread_id: &ThreadId, run_id: &RunId) -> Result<Run, BackendError> {
        self.get_json(&format!("/threads/{thread_id}/runs/{run_id}"))
            .await
    }

    async fn cancel_run(&self, thread_id: &ThreadId, run_id: &RunId) -> Result<Run, BackendError> {
        self.post_json(
            &format!("/threads/{thread_id}/runs/{run_id}/cancel"),
            &serde_json::json!({}),
        )
        .await
    }

    async fn list_messages(&self, thread_id: &ThreadId) -> Result<Vec<ThreadMessage>, BackendError> {
        let list: MessageListObject = self
            .get_json(&format!("/threads/{thread_id}/messages?order=desc"))
            .await?;
        Ok(list.data)
    }
}
