//! HTTP transport for the chunkload server.
//!
//! | Operation    | Request                                               |
//! |--------------|-------------------------------------------------------|
//! | initialize   | `POST /api/uploads` with the file info as JSON        |
//! | send_chunk   | `PUT /api/uploads/{id}/chunks/{index}?total={n}`      |
//! | finalize     | `POST /api/uploads/{id}/finalize`                     |
//! | preview      | `GET /api/uploads/{id}/preview`                       |

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::{TransportError, TransportResult};
use crate::types::{FileInfo, Preview, SessionId};
use crate::upload::UploadTransport;

/// Session creation response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionCreated {
    session_id: SessionId,
}

/// Error body returned by the server on non-2xx responses
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Talks to a chunkload server over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send `request` unless cancelled first, and map non-2xx statuses to errors.
    async fn send(&self, request: RequestBuilder, cancel: &CancellationToken) -> TransportResult<Response> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            response = request.send() => response?,
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    /// Fetch the structured preview of a finalized session.
    pub async fn fetch_preview(&self, session_id: &str, cancel: &CancellationToken) -> TransportResult<Preview> {
        let url = self.url(&format!("/api/uploads/{}/preview", session_id));
        let response = self.send(self.client.get(url), cancel).await?;
        Ok(response.json::<Preview>().await?)
    }
}

/// The `error` field of a JSON error body, or the raw body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) if body.trim().is_empty() => "empty response".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn initialize(&self, file: &FileInfo, cancel: &CancellationToken) -> TransportResult<SessionId> {
        let request = self.client.post(self.url("/api/uploads")).json(file);
        let response = self.send(request, cancel).await?;
        let created: SessionCreated = response.json().await?;

        log::debug!("Opened session {} for {}", created.session_id, file.name);
        Ok(created.session_id)
    }

    async fn send_chunk(
        &self,
        session_id: &str,
        chunk_index: u64,
        total_chunks: u64,
        data: &[u8],
        cancel: &CancellationToken,
    ) -> TransportResult<()> {
        let url = self.url(&format!("/api/uploads/{}/chunks/{}", session_id, chunk_index));
        let request = self
            .client
            .put(url)
            .query(&[("total", total_chunks)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data.to_vec());

        self.send(request, cancel).await?;
        Ok(())
    }

    async fn finalize(&self, session_id: &str, cancel: &CancellationToken) -> TransportResult<()> {
        let url = self.url(&format!("/api/uploads/{}/finalize", session_id));
        self.send(self.client.post(url), cancel).await?;
        Ok(())
    }
}
