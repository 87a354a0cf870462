//! Client for the backend's message routes.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::SyncError;
use crate::model::WireMessage;

/// The authoritative message source. Implemented over HTTP in production and
/// scripted in tests.
#[async_trait]
pub trait MessageApi: Send + Sync + 'static {
    /// Newest messages (up to 50), oldest first, with `is_read` scoped to `user_id`.
    async fn fetch_messages(&self, user_id: &str) -> Result<Vec<WireMessage>, SyncError>;

    /// Create a message. Returns the stored row, which the server also broadcasts.
    async fn send_message(&self, user_id: &str, text: &str) -> Result<WireMessage, SyncError>;

    async fn mark_read(&self, user_id: &str, message_id: u64) -> Result<(), SyncError>;
}

#[derive(Clone)]
pub struct HttpMessageApi {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl HttpMessageApi {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("build http client: {e}"))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn transport_error(e: reqwest::Error) -> SyncError {
    SyncError::NetworkUnavailable(e.to_string())
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    Err(SyncError::ServerRejected {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, SyncError> {
    let bytes = resp.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&bytes).map_err(|e| SyncError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl MessageApi for HttpMessageApi {
    async fn fetch_messages(&self, user_id: &str) -> Result<Vec<WireMessage>, SyncError> {
        let resp = self
            .client
            .get(self.url("/messages"))
            .query(&[("user_id", user_id)])
            .send()
            .await
            .map_err(transport_error)?;
        decode(check_status(resp).await?).await
    }

    async fn send_message(&self, user_id: &str, text: &str) -> Result<WireMessage, SyncError> {
        let body = serde_json::json!({ "user_id": user_id, "text": text });
        let resp = self
            .client
            .post(self.url("/messages"))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        decode(check_status(resp).await?).await
    }

    async fn mark_read(&self, user_id: &str, message_id: u64) -> Result<(), SyncError> {
        let body = serde_json::json!({ "user_id": user_id, "message_id": message_id });
        let resp = self
            .client
            .post(self.url("/messages/mark-read"))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(resp).await?;
        Ok(())
    }
}

/// Bound any API call, so a hung request cannot stall sync.
pub(crate) async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, SyncError>>,
) -> Result<T, SyncError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::NetworkUnavailable(format!(
            "request timed out after {limit:?}"
        ))),
    }
}
