//! Remote replay transports.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, RetryPolicy};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::sync_queue::{OperationId, RemoteReplay, SyncOperation};

/// Header carrying the operation ID so the remote can deduplicate.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[derive(Serialize)]
struct ReplayBody<'a> {
    id: &'a OperationId,
    key: &'a str,
    value: &'a serde_json::Value,
    enqueued_at: DateTime<Utc>,
}

/// Replays operations as JSON `POST`s to a fixed endpoint.
///
/// Any 2xx response confirms the operation. Retries are left to the sync
/// queue, so each call makes exactly one request.
pub struct HttpReplayClient {
    http: Arc<dyn HttpClient>,
    endpoint: String,
    timeout: Duration,
}

impl HttpReplayClient {
    pub fn new(http: Arc<dyn HttpClient>, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RemoteReplay for HttpReplayClient {
    async fn replay(&self, operation: &SyncOperation) -> Result<()> {
        let body = ReplayBody {
            id: &operation.id,
            key: &operation.key,
            value: &operation.value,
            enqueued_at: operation.enqueued_at,
        };
        let request = HttpRequest::new(HttpMethod::Post, self.endpoint.as_str())
            .header(IDEMPOTENCY_HEADER, operation.id.to_string())
            .timeout(self.timeout)
            .json(&body)
            .map_err(|e| SyncError::Serialization(e.to_string()))?;

        let response = self
            .http
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        if !response.is_success() {
            return Err(SyncError::Network(format!(
                "replay of '{}' rejected with HTTP {}",
                operation.key, response.status
            )));
        }

        debug!(operation_id = %operation.id, status = response.status, "Operation replayed");
        Ok(())
    }
}

/// Replay target used when no sync endpoint is configured.
///
/// Every replay fails, so operations stay queued until a real transport is
/// supplied.
#[derive(Debug, Default)]
pub struct UnconfiguredReplay;

#[async_trait]
impl RemoteReplay for UnconfiguredReplay {
    async fn replay(&self, _operation: &SyncOperation) -> Result<()> {
        Err(SyncError::Network("no sync endpoint configured".to_string()))
    }
}
