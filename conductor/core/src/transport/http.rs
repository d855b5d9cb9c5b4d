//! HTTP turn transport (reqwest)

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use super::traits::{TurnError, TurnResponse, TurnTransport};
use crate::messages::ThreadId;
use crate::protocol::{rejection_detail, TurnRequest, THREAD_HEADER};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts turns to the daemon's `/api/chat` endpoint
///
/// No overall request timeout is set: the endpoint holds the request open
/// while the run is polled, and the body streams afterwards.
#[derive(Clone, Debug)]
pub struct HttpTurnTransport {
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpTurnTransport {
    /// Create a transport for `endpoint` (e.g. `http://127.0.0.1:3000/api/chat`)
    pub fn new(endpoint: impl Into<String>) -> Result<Self, TurnError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TurnError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
        })
    }

    /// Endpoint turns are posted to
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TurnTransport for HttpTurnTransport {
    async fn open(&self, request: &TurnRequest) -> Result<TurnResponse, TurnError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| TurnError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = rejection_detail(status.as_u16(), &body);
            tracing::debug!(status = status.as_u16(), detail = %detail, "Turn rejected");
            return Err(TurnError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        let thread_id = response
            .headers()
            .get(THREAD_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(ThreadId::from);

        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| TurnError::Network(e.to_string()))
            })
            .boxed();

        Ok(TurnResponse { thread_id, body })
    }
}
