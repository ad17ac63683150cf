//! Ingest completion notifications.
//!
//! After every ingest run the orchestrator posts
//! `{"requestId", "status", "fileName"}` to the caller's webhook. Delivery is
//! best-effort: failures are logged and never retried.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub request_id: String,
    pub status: String,
    pub file_name: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, url: &str, payload: &WebhookPayload) -> Result<()>;
}

/// Posts the payload as JSON.
pub struct HttpNotifier {
    client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, url: &str, payload: &WebhookPayload) -> Result<()> {
        let resp = self.client.post(url).json(payload).send().await?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("webhook {} answered {}", url, status);
        }
        info!(request_id = %payload.request_id, status = %payload.status, "webhook delivered");
        Ok(())
    }
}

/// Drops every notification. Backs [`Ingestor::offline`](crate::ingest::Ingestor::offline).
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _url: &str, _payload: &WebhookPayload) -> Result<()> {
        Ok(())
    }
}

/// Deliver a notification, logging instead of propagating failure.
pub async fn deliver(notifier: &dyn Notifier, url: &str, payload: &WebhookPayload) {
    if let Err(e) = notifier.notify(url, payload).await {
        warn!(request_id = %payload.request_id, url, error = %e, "webhook delivery failed");
    }
}
