use std::time::Duration;

use serde::Serialize;

use crate::config::SyncConfig;
use crate::store::operations::sync_queue::{OperationKind, PendingOperation};
use crate::sync::SyncError;

/// Remote end of the mirror.
#[axum::async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn deliver(&self, op: &PendingOperation) -> Result<(), SyncError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a> {
    id: &'a str,
    kind: OperationKind,
    payload: &'a serde_json::Value,
    timestamp: chrono::DateTime<chrono::Utc>,
}

/// JSON-over-HTTP transport: `POST {base_url}/sync/{kind}`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        if config.base_url.trim().is_empty() {
            return Err(SyncError::NotConfigured);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self, kind: OperationKind) -> String {
        format!("{}/sync/{}", self.base_url, kind.as_str())
    }
}

#[axum::async_trait]
impl RemoteTransport for HttpTransport {
    async fn deliver(&self, op: &PendingOperation) -> Result<(), SyncError> {
        let mut request = self.client.post(self.endpoint(op.kind)).json(&Envelope {
            id: &op.id,
            kind: op.kind,
            payload: &op.payload,
            timestamp: op.timestamp,
        });
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        Err(SyncError::Rejected {
            status: status.as_u16(),
            message: message.chars().take(200).collect(),
        })
    }
}
