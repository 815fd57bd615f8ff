//! Collaborators the orchestrators call out to.
//!
//! Storage, credential handling, payload signing and HTTP transport all live
//! outside this crate. Each is an `async_trait` so deployments can plug in
//! database- or network-backed implementations; [`crate::memory`] has
//! in-process ones.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use payloop_common::{OrderStatusUpdate, PaymentConfig, WebhookAttempt};
use serde::{Deserialize, Serialize};

/// Persistence for orders. Updates are addressed by order id and must be
/// idempotent for repeated identical requests.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn update_order_status(&self, update: &OrderStatusUpdate) -> anyhow::Result<()>;
}

/// Source of per-merchant processor configuration, credentials included.
#[async_trait]
pub trait ProcessorConfigProvider: Send + Sync {
    async fn processor_config(
        &self,
        merchant_id: &str,
        processor: &str,
    ) -> anyhow::Result<PaymentConfig>;
}

/// Persistence for webhook event records.
#[async_trait]
pub trait WebhookEventStore: Send + Sync {
    /// Record the attempt count, last-attempt time and next retry time.
    async fn record_attempt(&self, event_id: &str, attempt: &WebhookAttempt)
    -> anyhow::Result<()>;

    async fn mark_delivered(&self, event_id: &str, delivered_at: DateTime<Utc>)
    -> anyhow::Result<()>;

    /// Mark the event permanently failed; no further attempts will be made.
    async fn mark_failed(&self, event_id: &str, last_error: &str) -> anyhow::Result<()>;
}

/// Computes the signature attached to a webhook request.
pub trait WebhookSigner: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the secret cannot be used as a signing key.
    fn sign(&self, secret: &str, body: &[u8]) -> anyhow::Result<String>;
}

/// A fully prepared webhook request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRequest {
    pub event_id: String,
    pub url: String,
    pub body: Vec<u8>,
    /// Present only when the merchant has a webhook secret configured
    pub signature: Option<String>,
}

/// What the transport observed for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportResponse {
    pub status_code: u16,
    /// The transport's own verdict; only `true` counts as delivered
    pub success: bool,
}

/// Sends webhook requests. Implementations apply their own request timeout.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn deliver(&self, request: &WebhookRequest) -> anyhow::Result<TransportResponse>;
}
