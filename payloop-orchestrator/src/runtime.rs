//! Instance runtime.
//!
//! Runs each payment and webhook orchestration as its own tokio task and keeps
//! a table of the running ones so signals can be routed to them by id.

use std::{any::Any, future::Future, panic::AssertUnwindSafe, sync::Arc};

use dashmap::{DashMap, DashSet, mapref::entry::Entry};
use futures_util::FutureExt;
use payloop_common::{
    PaymentInput, PaymentResult, RefundInput, RefundResult, WebhookDeliveryInput,
    WebhookDeliveryResult, error_codes, incoming, internal,
};
use tokio::task::JoinHandle;

use crate::{
    activities::Activities,
    config::OrchestratorConfig,
    error::OrchestrationError,
    payment::{PaymentPhase, PaymentSignal, PaymentSignals, PaymentState, PaymentWorkflow},
    ports::{
        OrderStore, ProcessorConfigProvider, WebhookEventStore, WebhookSigner, WebhookTransport,
    },
    registry::ProcessorRegistry,
    webhook::WebhookDelivery,
};

/// Instance id of the payment orchestration for `order_id`.
#[must_use]
pub fn payment_instance_id(order_id: &str) -> String {
    format!("payment-{order_id}")
}

/// Instance id of the webhook delivery for `event_id`.
#[must_use]
pub fn webhook_instance_id(event_id: &str) -> String {
    format!("webhook-{event_id}")
}

/// External systems the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub configs: Arc<dyn ProcessorConfigProvider>,
    pub orders: Arc<dyn OrderStore>,
    pub webhook_transport: Arc<dyn WebhookTransport>,
    pub webhook_signer: Arc<dyn WebhookSigner>,
    pub webhook_events: Arc<dyn WebhookEventStore>,
}

/// Removes an instance from its table when the instance's task ends, however
/// it ends.
struct Deregister<F: FnMut()>(F);

impl<F: FnMut()> Drop for Deregister<F> {
    fn drop(&mut self) {
        (self.0)();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// A running payment orchestration.
#[derive(Debug)]
pub struct PaymentHandle {
    instance_id: String,
    signals: PaymentSignals,
    task: JoinHandle<PaymentResult>,
}

impl PaymentHandle {
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Signal handle for this instance; equivalent to addressing it through
    /// the [`Orchestrator`] by id.
    #[must_use]
    pub const fn signals(&self) -> &PaymentSignals {
        &self.signals
    }

    #[must_use]
    pub fn phase(&self) -> PaymentPhase {
        self.signals.phase()
    }

    /// Wait for the orchestration's result.
    pub async fn result(self) -> PaymentResult {
        match self.task.await {
            Ok(result) => result,
            Err(error) => {
                let message = format!("Payment instance {} aborted: {error}", self.instance_id);
                internal!(
                    level = ERROR,
                    instance_id = %self.instance_id,
                    error = %message,
                    "Payment instance aborted"
                );
                PaymentResult::failure(error_codes::WORKFLOW_ERROR, message)
            }
        }
    }
}

/// A running webhook delivery.
#[derive(Debug)]
pub struct WebhookHandle {
    instance_id: String,
    task: JoinHandle<WebhookDeliveryResult>,
}

impl WebhookHandle {
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub async fn result(self) -> WebhookDeliveryResult {
        match self.task.await {
            Ok(result) => result,
            Err(error) => WebhookDeliveryResult {
                success: false,
                status_code: None,
                attempts: 0,
                delivered_at: None,
                error_message: Some(format!(
                    "Webhook instance {} aborted: {error}",
                    self.instance_id
                )),
            },
        }
    }
}

pub struct Orchestrator {
    activities: Activities,
    payments: PaymentWorkflow,
    webhooks: WebhookDelivery,
    running_payments: Arc<DashMap<String, PaymentSignals>>,
    running_webhooks: Arc<DashSet<String>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("activities", &self.activities)
            .field("running_payments", &self.running_payments.len())
            .field("running_webhooks", &self.running_webhooks.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        config: &OrchestratorConfig,
        registry: Arc<ProcessorRegistry>,
        collaborators: Collaborators,
    ) -> Self {
        let activities = Activities::new(
            registry,
            collaborators.configs,
            collaborators.orders,
            config.activities.clone(),
        );

        Self {
            payments: PaymentWorkflow::new(activities.clone(), config.payment.action_timeout()),
            webhooks: WebhookDelivery::new(
                collaborators.webhook_transport,
                collaborators.webhook_signer,
                collaborators.webhook_events,
                config.webhook.clone(),
            ),
            activities,
            running_payments: Arc::new(DashMap::new()),
            running_webhooks: Arc::new(DashSet::new()),
        }
    }

    /// Start the payment orchestration for `input.order_id`.
    ///
    /// Must be called from within a tokio runtime. Input is validated by the
    /// instance itself, so invalid input yields a `workflow_error` result and
    /// a failed order rather than an error here.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::WorkflowAlreadyStarted`] if this order
    /// already has a running orchestration.
    pub fn start_payment(&self, input: PaymentInput) -> Result<PaymentHandle, OrchestrationError> {
        let signals = PaymentSignals::new(&input.order_id);
        let instance_id = self.register_payment(&input.order_id, &signals)?;

        internal!(level = INFO, instance_id = %instance_id, "Starting payment instance");

        Ok(
            self.spawn_payment(instance_id, input, signals, |workflow, input, signals| async move {
                workflow.run(&input, &signals).await
            }),
        )
    }

    /// Continue a payment orchestration from a persisted [`PaymentState`].
    ///
    /// # Errors
    ///
    /// As for [`Orchestrator::start_payment`].
    pub fn resume_payment(
        &self,
        input: PaymentInput,
        state: PaymentState,
    ) -> Result<PaymentHandle, OrchestrationError> {
        let signals = PaymentSignals::restore(&input.order_id, state);
        let instance_id = self.register_payment(&input.order_id, &signals)?;

        internal!(
            level = INFO,
            instance_id = %instance_id,
            phase = %signals.phase(),
            "Resuming payment instance"
        );

        Ok(
            self.spawn_payment(instance_id, input, signals, |workflow, input, signals| async move {
                workflow.resume(&input, &signals).await
            }),
        )
    }

    fn register_payment(
        &self,
        order_id: &str,
        signals: &PaymentSignals,
    ) -> Result<String, OrchestrationError> {
        let instance_id = payment_instance_id(order_id);

        match self.running_payments.entry(instance_id.clone()) {
            Entry::Occupied(_) => Err(OrchestrationError::WorkflowAlreadyStarted(instance_id)),
            Entry::Vacant(entry) => {
                entry.insert(signals.clone());
                Ok(instance_id)
            }
        }
    }

    /// Spawn `body` as the instance's task.
    ///
    /// A panic inside the orchestration is caught and handled like any other
    /// workflow failure: the instance moves to `Failed` and the order is
    /// marked failed before the result is returned.
    fn spawn_payment<F, Fut>(
        &self,
        instance_id: String,
        input: PaymentInput,
        signals: PaymentSignals,
        body: F,
    ) -> PaymentHandle
    where
        F: FnOnce(PaymentWorkflow, Arc<PaymentInput>, PaymentSignals) -> Fut,
        Fut: Future<Output = PaymentResult> + Send + 'static,
    {
        let running = Arc::clone(&self.running_payments);
        let task_id = instance_id.clone();
        let workflow = self.payments.clone();
        let input = Arc::new(input);
        let orchestration = body(workflow.clone(), Arc::clone(&input), signals.clone());
        let task_signals = signals.clone();

        let task = tokio::spawn(async move {
            let _deregister = Deregister(move || {
                running.remove(&task_id);
            });

            match AssertUnwindSafe(orchestration).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    let error = OrchestrationError::WorkflowError(format!(
                        "Payment orchestration panicked: {}",
                        panic_message(payload.as_ref())
                    ));
                    drop(payload);
                    workflow.fail(&input, &task_signals, &error).await
                }
            }
        });

        PaymentHandle {
            instance_id,
            signals,
            task,
        }
    }

    /// Deliver a signal to a running payment orchestration.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::WorkflowNotFound`] if no orchestration
    /// with this id is running.
    pub fn signal(
        &self,
        instance_id: &str,
        signal: PaymentSignal,
    ) -> Result<PaymentPhase, OrchestrationError> {
        let signals = self.payment_signals(instance_id)?;
        incoming!(level = DEBUG, instance_id, ?signal, "Routing signal");
        Ok(signals.deliver(signal))
    }

    /// Deliver a "payment completed" signal.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::signal`].
    pub fn signal_completion(
        &self,
        instance_id: &str,
        success: bool,
        processor_transaction_id: Option<String>,
    ) -> Result<PaymentPhase, OrchestrationError> {
        self.signal(
            instance_id,
            PaymentSignal::Completed {
                success,
                processor_transaction_id,
            },
        )
    }

    /// Deliver a "payment cancelled" signal.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::signal`].
    pub fn signal_cancellation(&self, instance_id: &str) -> Result<PaymentPhase, OrchestrationError> {
        self.signal(instance_id, PaymentSignal::Cancelled)
    }

    /// Current phase of a running payment orchestration.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::WorkflowNotFound`] if no orchestration
    /// with this id is running.
    pub fn phase(&self, instance_id: &str) -> Result<PaymentPhase, OrchestrationError> {
        Ok(self.payment_signals(instance_id)?.phase())
    }

    /// Snapshot of a running payment orchestration, suitable for persisting
    /// and handing back to [`Orchestrator::resume_payment`].
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::WorkflowNotFound`] if no orchestration
    /// with this id is running.
    pub fn snapshot(&self, instance_id: &str) -> Result<PaymentState, OrchestrationError> {
        Ok(self.payment_signals(instance_id)?.snapshot())
    }

    #[must_use]
    pub fn is_running(&self, instance_id: &str) -> bool {
        self.running_payments.contains_key(instance_id)
            || self.running_webhooks.contains(instance_id)
    }

    fn payment_signals(&self, instance_id: &str) -> Result<PaymentSignals, OrchestrationError> {
        self.running_payments
            .get(instance_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| OrchestrationError::WorkflowNotFound(instance_id.to_string()))
    }

    /// Start delivering one webhook event.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::WorkflowAlreadyStarted`] if this event is
    /// already being delivered.
    pub fn start_webhook_delivery(
        &self,
        input: WebhookDeliveryInput,
    ) -> Result<WebhookHandle, OrchestrationError> {
        let instance_id = webhook_instance_id(&input.webhook_event_id);
        if !self.running_webhooks.insert(instance_id.clone()) {
            return Err(OrchestrationError::WorkflowAlreadyStarted(instance_id));
        }

        internal!(level = INFO, instance_id = %instance_id, "Starting webhook instance");

        let running = Arc::clone(&self.running_webhooks);
        let task_id = instance_id.clone();
        let delivery = self.webhooks.clone();

        let task = tokio::spawn(async move {
            let _deregister = Deregister(move || {
                running.remove(&task_id);
            });
            delivery.run(&input).await
        });

        Ok(WebhookHandle { instance_id, task })
    }

    /// Capture an authorized payment outside of any orchestration.
    ///
    /// # Errors
    ///
    /// See [`Activities::capture_payment`].
    pub async fn capture(
        &self,
        processor: &str,
        merchant_id: &str,
        processor_order_id: &str,
        amount: u64,
    ) -> Result<PaymentResult, OrchestrationError> {
        self.activities
            .capture_payment(processor, merchant_id, processor_order_id, amount)
            .await
    }

    /// # Errors
    ///
    /// See [`Activities::refund_payment`].
    pub async fn refund(
        &self,
        processor: &str,
        merchant_id: &str,
        refund: &RefundInput,
    ) -> Result<RefundResult, OrchestrationError> {
        self.activities
            .refund_payment(processor, merchant_id, refund)
            .await
    }

    /// # Errors
    ///
    /// See [`Activities::get_payment_status`].
    pub async fn payment_status(
        &self,
        processor: &str,
        merchant_id: &str,
        processor_order_id: &str,
    ) -> Result<PaymentResult, OrchestrationError> {
        self.activities
            .get_payment_status(processor, merchant_id, processor_order_id)
            .await
    }
}
