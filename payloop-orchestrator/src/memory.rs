//! In-memory collaborators.
//!
//! These keep everything in process memory behind `parking_lot` locks. They
//! are primarily intended for testing and local runs, the same way the
//! memory-backed spool is: production deployments plug database, vault and
//! HTTP backed implementations of the [`crate::ports`] traits instead.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use payloop_common::{
    OrderStatus, OrderStatusUpdate, PaymentConfig, PaymentInput, PaymentResult, PaymentStatus,
    RefundResult, RefundStatus, WebhookAttempt,
};

use crate::{
    ports::{
        OrderStore, ProcessorConfigProvider, TransportResponse, WebhookEventStore,
        WebhookRequest, WebhookTransport,
    },
    processor::PaymentProcessor,
};

/// A canned reaction to one call.
#[derive(Debug, Clone)]
pub enum Scripted<T> {
    Respond(T),
    Fail(String),
    /// Never completes; exercises call timeouts.
    Hang,
}

impl<T> Scripted<T> {
    async fn play(self) -> anyhow::Result<T> {
        match self {
            Self::Respond(value) => Ok(value),
            Self::Fail(message) => Err(anyhow!(message)),
            Self::Hang => std::future::pending().await,
        }
    }
}

/// A processor call as seen by [`ScriptedProcessor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorCall {
    pub operation: &'static str,
    /// Order id for `create_payment`, processor reference otherwise
    pub reference: String,
    pub amount: Option<u64>,
}

/// Processor whose `create_payment` responses are scripted up front.
///
/// Once the script runs out, `create_payment` captures the payment. The other
/// capabilities always succeed.
#[derive(Debug, Clone)]
pub struct ScriptedProcessor {
    name: String,
    create: Arc<Mutex<VecDeque<Scripted<PaymentResult>>>>,
    calls: Arc<Mutex<Vec<ProcessorCall>>>,
}

impl ScriptedProcessor {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            create: Arc::default(),
            calls: Arc::default(),
        }
    }

    /// Queue the reaction of the next unscripted `create_payment` call.
    #[must_use]
    pub fn then(self, step: Scripted<PaymentResult>) -> Self {
        self.create.lock().push_back(step);
        self
    }

    #[must_use]
    pub fn calls(&self) -> Vec<ProcessorCall> {
        self.calls.lock().clone()
    }

    #[must_use]
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    fn record(&self, operation: &'static str, reference: &str, amount: Option<u64>) {
        self.calls.lock().push(ProcessorCall {
            operation,
            reference: reference.to_string(),
            amount,
        });
    }

    fn processor_order_id(&self, order_id: &str) -> String {
        format!("{}_order_{order_id}", self.name)
    }
}

#[async_trait]
impl PaymentProcessor for ScriptedProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_payment(
        &self,
        input: &PaymentInput,
        _config: &PaymentConfig,
    ) -> anyhow::Result<PaymentResult> {
        self.record("createPayment", &input.order_id, Some(input.amount));

        let step = self.create.lock().pop_front();
        match step {
            Some(step) => step.play().await,
            None => Ok(PaymentResult {
                processor_order_id: Some(self.processor_order_id(&input.order_id)),
                processor_transaction_id: Some(format!("{}_txn_{}", self.name, input.order_id)),
                ..PaymentResult::with_status(PaymentStatus::Captured)
            }),
        }
    }

    async fn capture_payment(
        &self,
        processor_order_id: &str,
        amount: u64,
        _config: &PaymentConfig,
    ) -> anyhow::Result<PaymentResult> {
        self.record("capturePayment", processor_order_id, Some(amount));

        Ok(PaymentResult {
            processor_order_id: Some(processor_order_id.to_string()),
            ..PaymentResult::with_status(PaymentStatus::Captured)
        })
    }

    async fn refund_payment(
        &self,
        processor_transaction_id: &str,
        amount: u64,
        _config: &PaymentConfig,
    ) -> anyhow::Result<RefundResult> {
        self.record("refundPayment", processor_transaction_id, Some(amount));

        Ok(RefundResult {
            success: true,
            refund_id: Some(format!("{}_refund_{processor_transaction_id}", self.name)),
            status: RefundStatus::Pending,
            error_code: None,
            error_message: None,
        })
    }

    async fn get_payment_status(
        &self,
        processor_order_id: &str,
        _config: &PaymentConfig,
    ) -> anyhow::Result<PaymentResult> {
        self.record("getPaymentStatus", processor_order_id, None);

        Ok(PaymentResult {
            processor_order_id: Some(processor_order_id.to_string()),
            ..PaymentResult::with_status(PaymentStatus::Captured)
        })
    }
}

/// Order store that keeps every update it receives.
///
/// Can be told to fail its next N updates.
#[derive(Debug, Clone, Default)]
pub struct MemoryOrderStore {
    updates: Arc<Mutex<Vec<OrderStatusUpdate>>>,
    failures: Arc<Mutex<u32>>,
}

impl MemoryOrderStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` updates fail.
    pub fn fail_next(&self, times: u32) {
        *self.failures.lock() = times;
    }

    /// Every accepted update, in order.
    #[must_use]
    pub fn updates(&self) -> Vec<OrderStatusUpdate> {
        self.updates.lock().clone()
    }

    #[must_use]
    pub fn updates_for(&self, order_id: &str) -> Vec<OrderStatusUpdate> {
        self.updates
            .lock()
            .iter()
            .filter(|update| update.order_id == order_id)
            .cloned()
            .collect()
    }

    /// Most recent persisted status of an order.
    #[must_use]
    pub fn status(&self, order_id: &str) -> Option<OrderStatus> {
        self.updates
            .lock()
            .iter()
            .rev()
            .find(|update| update.order_id == order_id)
            .map(|update| update.status)
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn update_order_status(&self, update: &OrderStatusUpdate) -> anyhow::Result<()> {
        {
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(anyhow!(
                    "order store unavailable while updating {}",
                    update.order_id
                ));
            }
        }

        self.updates.lock().push(update.clone());
        Ok(())
    }
}

/// Processor configs keyed by (merchant, processor).
#[derive(Debug, Clone, Default)]
pub struct StaticConfigProvider {
    configs: Arc<HashMap<(String, String), PaymentConfig>>,
}

impl StaticConfigProvider {
    #[must_use]
    pub fn new(configs: impl IntoIterator<Item = PaymentConfig>) -> Self {
        Self {
            configs: Arc::new(
                configs
                    .into_iter()
                    .map(|config| {
                        (
                            (config.merchant_id.clone(), config.processor.clone()),
                            config,
                        )
                    })
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl ProcessorConfigProvider for StaticConfigProvider {
    async fn processor_config(
        &self,
        merchant_id: &str,
        processor: &str,
    ) -> anyhow::Result<PaymentConfig> {
        self.configs
            .get(&(merchant_id.to_string(), processor.to_string()))
            .cloned()
            .ok_or_else(|| {
                anyhow!("No {processor} configuration for merchant {merchant_id}")
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventStatus {
    Pending,
    Delivered,
    Failed,
}

/// Snapshot of one webhook event record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEventRecord {
    pub status: WebhookEventStatus,
    pub attempts: Vec<WebhookAttempt>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for WebhookEventRecord {
    fn default() -> Self {
        Self {
            status: WebhookEventStatus::Pending,
            attempts: Vec::new(),
            delivered_at: None,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryWebhookEventStore {
    events: Arc<Mutex<HashMap<String, WebhookEventRecord>>>,
}

impl MemoryWebhookEventStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn record(&self, event_id: &str) -> Option<WebhookEventRecord> {
        self.events.lock().get(event_id).cloned()
    }
}

#[async_trait]
impl WebhookEventStore for MemoryWebhookEventStore {
    async fn record_attempt(
        &self,
        event_id: &str,
        attempt: &WebhookAttempt,
    ) -> anyhow::Result<()> {
        let mut events = self.events.lock();
        let record = events.entry(event_id.to_string()).or_default();
        record.last_error.clone_from(&attempt.error);
        record.attempts.push(attempt.clone());
        Ok(())
    }

    async fn mark_delivered(
        &self,
        event_id: &str,
        delivered_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut events = self.events.lock();
        let record = events.entry(event_id.to_string()).or_default();
        record.status = WebhookEventStatus::Delivered;
        record.delivered_at = Some(delivered_at);
        Ok(())
    }

    async fn mark_failed(&self, event_id: &str, last_error: &str) -> anyhow::Result<()> {
        let mut events = self.events.lock();
        let record = events.entry(event_id.to_string()).or_default();
        record.status = WebhookEventStatus::Failed;
        record.last_error = Some(last_error.to_string());
        Ok(())
    }
}

/// Transport replaying scripted responses, then answering `200 OK`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Scripted<TransportResponse>>>>,
    requests: Arc<Mutex<Vec<WebhookRequest>>>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn then(self, step: Scripted<TransportResponse>) -> Self {
        self.script.lock().push_back(step);
        self
    }

    /// Queue the same reaction `times` times.
    #[must_use]
    pub fn then_repeat(self, step: &Scripted<TransportResponse>, times: usize) -> Self {
        self.script
            .lock()
            .extend(std::iter::repeat_n(step.clone(), times));
        self
    }

    #[must_use]
    pub fn requests(&self) -> Vec<WebhookRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl WebhookTransport for ScriptedTransport {
    async fn deliver(&self, request: &WebhookRequest) -> anyhow::Result<TransportResponse> {
        self.requests.lock().push(request.clone());

        let step = self.script.lock().pop_front();
        match step {
            Some(step) => step.play().await,
            None => Ok(TransportResponse {
                status_code: 200,
                success: true,
            }),
        }
    }
}
