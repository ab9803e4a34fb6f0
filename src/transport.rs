//! Transport seam for bulk translation. The subsystem treats the backend
//! as an external collaborator: it only needs a byte stream of
//! newline-delimited JSON records and cancellation by dropping the stream.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Serialize;
use std::time::Duration;

use crate::TranslateError;

/// One article submitted for bulk title/summary translation.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub id: String,
    pub title: String,
    pub summary: String,
}

/// Byte stream of a batch response body. Dropping it aborts the underlying
/// connection, which is how batch cancellation reaches the wire.
pub type RecordByteStream = BoxStream<'static, Result<Bytes, TranslateError>>;

/// Backend seam: opens a bulk-translation request and exposes its body as
/// an incrementally readable stream.
#[async_trait]
pub trait TranslationTransport: Send + Sync {
    async fn open_batch_stream(
        &self,
        items: &[BatchItem],
        target_language: &str,
    ) -> Result<RecordByteStream, TranslateError>;
}

/// HTTP transport posting to the translation backend. Success responses
/// stream back one JSON object per line: `{"id", "title", "summary"}`.
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl HttpTransport {
    /// Build a pooled client for the given batch-translation endpoint.
    /// Timeout policy lives here, at the transport, not in the coordinator.
    pub fn new(endpoint: &str, auth_token: Option<String>) -> Result<Self, TranslateError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TranslateError::ApiError(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            auth_token,
        })
    }
}

#[async_trait]
impl TranslationTransport for HttpTransport {
    async fn open_batch_stream(
        &self,
        items: &[BatchItem],
        target_language: &str,
    ) -> Result<RecordByteStream, TranslateError> {
        let body = serde_json::json!({
            "articles": items,
            "target_language": target_language,
        });

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(token) = &self.auth_token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| TranslateError::ApiError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(TranslateError::ApiError(format!(
                "unexpected status {}: {}",
                status,
                detail.chars().take(200).collect::<String>()
            )));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TranslateError::ApiError(e.to_string())))
            .boxed())
    }
}
