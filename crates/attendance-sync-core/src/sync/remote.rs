//! Remote attendance API client.

use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use crate::sync::types::{AttendanceBatch, RemoteError};

const BATCH_PATH: &str = "attendance/batch";

/// The remote authority for attendance.
///
/// Delivery is at-least-once: the same batch may be sent again after a
/// crash or a lost response, so implementations must tolerate duplicates.
#[async_trait]
pub trait AttendanceApi: Send + Sync {
    /// Record a batch of attendance for one lecture.
    async fn record_batch(&self, batch: &AttendanceBatch) -> Result<(), RemoteError>;
}

/// JSON-over-HTTP implementation of [`AttendanceApi`].
pub struct HttpAttendanceApi {
    client: reqwest::Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpAttendanceApi {
    /// Create a client posting to `{base_url}/attendance/batch`.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let endpoint = batch_endpoint(base_url)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            token,
        })
    }
}

/// Resolve the batch endpoint, treating `base_url` as a directory.
pub fn batch_endpoint(base_url: &str) -> Result<Url, RemoteError> {
    let mut base = base_url.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base)
        .and_then(|u| u.join(BATCH_PATH))
        .map_err(|e| RemoteError::InvalidUrl(format!("{base_url}: {e}")))
}

/// Pull a human-readable message out of an error response body.
fn error_message(body: &str, fallback: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["message", "error", "detail"] {
            if let Some(msg) = json[field].as_str() {
                return msg.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed.len() > 200 {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl AttendanceApi for HttpAttendanceApi {
    async fn record_batch(&self, batch: &AttendanceBatch) -> Result<(), RemoteError> {
        let mut request = self.client.post(self.endpoint.clone()).json(batch);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let fallback = status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string();
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            message: error_message(&body, &fallback),
        })
    }
}
