//! Webhook delivery orchestration.
//!
//! One instance pushes one event to one merchant endpoint, retrying with
//! exponential backoff up to a fixed ceiling. Every attempt is written to the
//! event record; bookkeeping failures are logged but never change the
//! delivery outcome.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use payloop_common::{
    WebhookAttempt, WebhookDeliveryInput, WebhookDeliveryResult, internal, outgoing,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    policy::RetryPolicy,
    ports::{WebhookEventStore, WebhookRequest, WebhookSigner, WebhookTransport},
};

/// Webhook retry configuration.
///
/// Same shape as [`RetryPolicy`], with defaults suited to merchant endpoints
/// that may be down for a while.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookOptions {
    /// Default: 5 attempts
    #[serde(default = "defaults::maximum_attempts")]
    pub maximum_attempts: u32,

    /// Default: 10 seconds
    #[serde(default = "defaults::initial_interval_ms")]
    pub initial_interval_ms: u64,

    /// Default: 3600 seconds
    #[serde(default = "defaults::maximum_interval_ms")]
    pub maximum_interval_ms: u64,

    /// Default: 2.0
    #[serde(default = "defaults::backoff_coefficient")]
    pub backoff_coefficient: f64,

    #[serde(default)]
    pub jitter_factor: f64,
}

impl Default for WebhookOptions {
    fn default() -> Self {
        Self {
            maximum_attempts: defaults::maximum_attempts(),
            initial_interval_ms: defaults::initial_interval_ms(),
            maximum_interval_ms: defaults::maximum_interval_ms(),
            backoff_coefficient: defaults::backoff_coefficient(),
            jitter_factor: 0.0,
        }
    }
}

impl WebhookOptions {
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_interval_ms: self.initial_interval_ms,
            maximum_interval_ms: self.maximum_interval_ms,
            backoff_coefficient: self.backoff_coefficient,
            maximum_attempts: self.maximum_attempts,
            jitter_factor: self.jitter_factor,
        }
    }
}

mod defaults {
    pub const fn maximum_attempts() -> u32 {
        5
    }

    pub const fn initial_interval_ms() -> u64 {
        10_000
    }

    pub const fn maximum_interval_ms() -> u64 {
        3_600_000
    }

    pub const fn backoff_coefficient() -> f64 {
        2.0
    }
}

#[derive(Clone)]
pub struct WebhookDelivery {
    transport: Arc<dyn WebhookTransport>,
    signer: Arc<dyn WebhookSigner>,
    events: Arc<dyn WebhookEventStore>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for WebhookDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookDelivery")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// What one attempt produced.
struct AttemptOutcome {
    status_code: Option<u16>,
    error: Option<String>,
}

impl WebhookDelivery {
    #[must_use]
    pub fn new(
        transport: Arc<dyn WebhookTransport>,
        signer: Arc<dyn WebhookSigner>,
        events: Arc<dyn WebhookEventStore>,
        options: WebhookOptions,
    ) -> Self {
        Self {
            transport,
            signer,
            events,
            policy: options.retry_policy(),
        }
    }

    /// Deliver `input`, retrying until the endpoint accepts it or attempts run
    /// out.
    #[instrument(skip_all, fields(event_id = %input.webhook_event_id))]
    pub async fn run(&self, input: &WebhookDeliveryInput) -> WebhookDeliveryResult {
        let event_id = input.webhook_event_id.as_str();

        let request = match self.prepare(input) {
            Ok(request) => request,
            Err(error) => {
                let message = format!("{error:#}");
                internal!(
                    level = ERROR,
                    event_id,
                    error = %message,
                    "Unable to prepare webhook request"
                );
                self.mark_failed(event_id, &message).await;
                return WebhookDeliveryResult {
                    success: false,
                    status_code: None,
                    attempts: 0,
                    delivered_at: None,
                    error_message: Some(message),
                };
            }
        };

        let mut attempt = 1;
        loop {
            let attempted_at = Utc::now();
            let outcome = self.attempt(&request).await;

            let retry_in = (outcome.error.is_some() && !self.policy.is_final_attempt(attempt))
                .then(|| self.policy.delay_for(attempt));

            self.record_attempt(
                event_id,
                &WebhookAttempt {
                    attempt,
                    attempted_at,
                    next_retry_at: retry_in.and_then(|delay| retry_at(attempted_at, delay)),
                    status_code: outcome.status_code,
                    error: outcome.error.clone(),
                },
            )
            .await;

            let Some(error) = outcome.error else {
                let delivered_at = Utc::now();
                internal!(
                    level = INFO,
                    event_id,
                    attempt,
                    status_code = outcome.status_code,
                    "Webhook delivered"
                );
                self.mark_delivered(event_id, delivered_at).await;

                return WebhookDeliveryResult {
                    success: true,
                    status_code: outcome.status_code,
                    attempts: attempt,
                    delivered_at: Some(delivered_at),
                    error_message: None,
                };
            };

            let Some(delay) = retry_in else {
                internal!(
                    level = ERROR,
                    event_id,
                    attempts = attempt,
                    error = %error,
                    "Webhook delivery permanently failed"
                );
                self.mark_failed(event_id, &error).await;

                return WebhookDeliveryResult {
                    success: false,
                    status_code: outcome.status_code,
                    attempts: attempt,
                    delivered_at: None,
                    error_message: Some(error),
                };
            };

            internal!(
                level = WARN,
                event_id,
                attempt,
                remaining = self.policy.remaining_attempts(attempt),
                delay_secs = delay.as_secs_f64(),
                error = %error,
                "Webhook attempt failed, retrying"
            );

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn prepare(&self, input: &WebhookDeliveryInput) -> anyhow::Result<WebhookRequest> {
        let body = serde_json::to_vec(&input.payload)?;
        let signature = input
            .webhook_secret
            .as_deref()
            .map(|secret| self.signer.sign(secret, &body))
            .transpose()?;

        Ok(WebhookRequest {
            event_id: input.webhook_event_id.clone(),
            url: input.webhook_url.clone(),
            body,
            signature,
        })
    }

    async fn attempt(&self, request: &WebhookRequest) -> AttemptOutcome {
        let event_id = request.event_id.as_str();
        outgoing!(level = DEBUG, event_id, url = %request.url, "Delivering webhook");

        match self.transport.deliver(request).await {
            Ok(response) if response.success => AttemptOutcome {
                status_code: Some(response.status_code),
                error: None,
            },
            Ok(response) => AttemptOutcome {
                status_code: Some(response.status_code),
                error: Some(format!(
                    "Webhook endpoint responded with status {}",
                    response.status_code
                )),
            },
            Err(error) => AttemptOutcome {
                status_code: None,
                error: Some(format!("{error:#}")),
            },
        }
    }

    async fn record_attempt(&self, event_id: &str, attempt: &WebhookAttempt) {
        if let Err(error) = self.events.record_attempt(event_id, attempt).await {
            outgoing!(
                level = WARN,
                event_id,
                attempt = attempt.attempt,
                error = %error,
                "Failed to record webhook attempt"
            );
        }
    }

    async fn mark_delivered(&self, event_id: &str, delivered_at: DateTime<Utc>) {
        if let Err(error) = self.events.mark_delivered(event_id, delivered_at).await {
            outgoing!(
                level = WARN,
                event_id,
                error = %error,
                "Failed to mark webhook delivered"
            );
        }
    }

    async fn mark_failed(&self, event_id: &str, last_error: &str) {
        if let Err(error) = self.events.mark_failed(event_id, last_error).await {
            outgoing!(
                level = WARN,
                event_id,
                error = %error,
                "Failed to mark webhook failed"
            );
        }
    }
}

fn retry_at(attempted_at: DateTime<Utc>, delay: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| attempted_at.checked_add_signed(delay))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::{
        memory::{MemoryWebhookEventStore, Scripted, ScriptedTransport, WebhookEventStatus},
        ports::TransportResponse,
    };

    struct LengthSigner;

    impl WebhookSigner for LengthSigner {
        fn sign(&self, secret: &str, body: &[u8]) -> anyhow::Result<String> {
            anyhow::ensure!(!secret.is_empty(), "empty webhook secret");
            Ok(format!("v1={}.{}", secret.len(), body.len()))
        }
    }

    struct BrokenEventStore;

    #[async_trait]
    impl WebhookEventStore for BrokenEventStore {
        async fn record_attempt(&self, _: &str, _: &WebhookAttempt) -> anyhow::Result<()> {
            anyhow::bail!("database is read-only")
        }

        async fn mark_delivered(&self, _: &str, _: DateTime<Utc>) -> anyhow::Result<()> {
            anyhow::bail!("database is read-only")
        }

        async fn mark_failed(&self, _: &str, _: &str) -> anyhow::Result<()> {
            anyhow::bail!("database is read-only")
        }
    }

    fn input(secret: Option<&str>) -> WebhookDeliveryInput {
        WebhookDeliveryInput {
            webhook_event_id: "evt_1".to_string(),
            merchant_id: "mer_1".to_string(),
            webhook_url: "https://merchant.example/hooks".to_string(),
            webhook_secret: secret.map(ToString::to_string),
            payload: json!({ "type": "payment.captured", "orderId": "ord_1" }),
        }
    }

    fn unavailable() -> Scripted<TransportResponse> {
        Scripted::Respond(TransportResponse {
            status_code: 503,
            success: false,
        })
    }

    fn delivery(
        transport: &ScriptedTransport,
        events: Arc<dyn WebhookEventStore>,
    ) -> WebhookDelivery {
        WebhookDelivery::new(
            Arc::new(transport.clone()),
            Arc::new(LengthSigner),
            events,
            WebhookOptions::default(),
        )
    }

    #[test]
    fn test_default_webhook_policy() {
        let policy = WebhookOptions::default().retry_policy();
        assert_eq!(policy.maximum_attempts, 5);
        assert_eq!(policy.initial_interval(), Duration::from_secs(10));
        assert_eq!(policy.maximum_interval(), Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_next_retry_for_each_failed_attempt() {
        let transport = ScriptedTransport::new().then_repeat(&unavailable(), 2);
        let events = MemoryWebhookEventStore::new();
        let delivery = delivery(&transport, Arc::new(events.clone()));

        let result = delivery.run(&input(None)).await;
        assert!(result.success);
        assert_eq!(result.attempts, 3);

        let record = events.record("evt_1").unwrap();
        assert_eq!(record.status, WebhookEventStatus::Delivered);
        assert_eq!(record.delivered_at, result.delivered_at);

        let gaps: Vec<_> = record
            .attempts
            .iter()
            .map(|a| a.next_retry_at.map(|at| (at - a.attempted_at).num_seconds()))
            .collect();
        assert_eq!(gaps, vec![Some(10), Some(20), None]);
        assert_eq!(record.attempts[0].status_code, Some(503));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signature_only_with_secret() {
        let transport = ScriptedTransport::new();
        let delivery = delivery(&transport, Arc::new(MemoryWebhookEventStore::new()));

        delivery.run(&input(None)).await;
        delivery.run(&input(Some("whsec_abc"))).await;

        let requests = transport.requests();
        assert_eq!(requests[0].signature, None);
        assert_eq!(
            requests[1].signature,
            Some(format!("v1=9.{}", requests[1].body.len()))
        );

        let body: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
        assert_eq!(body["type"], "payment.captured");
    }

    #[tokio::test(start_paused = true)]
    async fn test_signing_failure_makes_no_attempt() {
        let transport = ScriptedTransport::new();
        let events = MemoryWebhookEventStore::new();
        let delivery = delivery(&transport, Arc::new(events.clone()));

        let result = delivery.run(&input(Some(""))).await;
        assert!(!result.success);
        assert_eq!(result.attempts, 0);
        assert!(transport.requests().is_empty());
        assert_eq!(
            events.record("evt_1").unwrap().status,
            WebhookEventStatus::Failed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failures_do_not_change_outcome() {
        let transport = ScriptedTransport::new().then(Scripted::Fail("connection refused".into()));
        let delivery = delivery(&transport, Arc::new(BrokenEventStore));

        let result = delivery.run(&input(None)).await;
        assert!(result.success);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.status_code, Some(200));
    }
}
