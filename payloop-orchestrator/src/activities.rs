//! The call layer.
//!
//! Every side-effecting step of an orchestration (processor calls, order
//! status writes) goes through [`Activities`]. Each call is bounded by the
//! start-to-close timeout per attempt and retried by the configured
//! [`RetryPolicy`](crate::policy::RetryPolicy). Callers only ever see the
//! final outcome.

use std::{future::Future, sync::Arc};

use anyhow::anyhow;
use payloop_common::{
    OrderStatusUpdate, PaymentConfig, PaymentInput, PaymentResult, RefundInput, RefundResult,
    outgoing,
};
use tokio::time::Instant;

use crate::{
    error::OrchestrationError,
    policy::{ActivityOptions, RetryFailure},
    ports::{OrderStore, ProcessorConfigProvider},
    registry::ProcessorRegistry,
};

#[derive(Clone)]
pub struct Activities {
    registry: Arc<ProcessorRegistry>,
    configs: Arc<dyn ProcessorConfigProvider>,
    orders: Arc<dyn OrderStore>,
    options: ActivityOptions,
}

impl std::fmt::Debug for Activities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Activities")
            .field("processors", &self.registry.list())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Activities {
    #[must_use]
    pub fn new(
        registry: Arc<ProcessorRegistry>,
        configs: Arc<dyn ProcessorConfigProvider>,
        orders: Arc<dyn OrderStore>,
        options: ActivityOptions,
    ) -> Self {
        Self {
            registry,
            configs,
            orders,
            options,
        }
    }

    #[must_use]
    pub const fn options(&self) -> &ActivityOptions {
        &self.options
    }

    #[must_use]
    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    /// Create a payment with the processor named in `input`.
    ///
    /// # Errors
    ///
    /// An unknown processor is reported immediately, without any call being
    /// made. Everything else surfaces as
    /// [`OrchestrationError::ExternalCallFailed`] once retries run out.
    pub async fn process_payment(
        &self,
        input: &PaymentInput,
    ) -> Result<PaymentResult, OrchestrationError> {
        let processor = self.registry.resolve(&input.processor)?;

        self.invoke("createPayment", &input.order_id, || {
            let processor = Arc::clone(&processor);
            async move {
                let config = self.config(&input.merchant_id, &input.processor).await?;
                processor.create_payment(input, &config).await
            }
        })
        .await
    }

    /// Capture a previously authorized payment.
    ///
    /// # Errors
    ///
    /// See [`Activities::process_payment`].
    pub async fn capture_payment(
        &self,
        processor_name: &str,
        merchant_id: &str,
        processor_order_id: &str,
        amount: u64,
    ) -> Result<PaymentResult, OrchestrationError> {
        let processor = self.registry.resolve(processor_name)?;

        self.invoke("capturePayment", processor_order_id, || {
            let processor = Arc::clone(&processor);
            async move {
                let config = self.config(merchant_id, processor_name).await?;
                processor
                    .capture_payment(processor_order_id, amount, &config)
                    .await
            }
        })
        .await
    }

    /// Refund all or part of a captured payment.
    ///
    /// # Errors
    ///
    /// See [`Activities::process_payment`].
    pub async fn refund_payment(
        &self,
        processor_name: &str,
        merchant_id: &str,
        refund: &RefundInput,
    ) -> Result<RefundResult, OrchestrationError> {
        let processor = self.registry.resolve(processor_name)?;

        self.invoke("refundPayment", &refund.order_id, || {
            let processor = Arc::clone(&processor);
            async move {
                let config = self.config(merchant_id, processor_name).await?;
                processor
                    .refund_payment(&refund.transaction_id, refund.amount, &config)
                    .await
            }
        })
        .await
    }

    /// Query the processor for the current status of a payment.
    ///
    /// # Errors
    ///
    /// See [`Activities::process_payment`].
    pub async fn get_payment_status(
        &self,
        processor_name: &str,
        merchant_id: &str,
        processor_order_id: &str,
    ) -> Result<PaymentResult, OrchestrationError> {
        let processor = self.registry.resolve(processor_name)?;

        self.invoke("getPaymentStatus", processor_order_id, || {
            let processor = Arc::clone(&processor);
            async move {
                let config = self.config(merchant_id, processor_name).await?;
                processor
                    .get_payment_status(processor_order_id, &config)
                    .await
            }
        })
        .await
    }

    /// Persist a new order status.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::ExternalCallFailed`] once retries run out.
    pub async fn update_order_status(
        &self,
        update: &OrderStatusUpdate,
    ) -> Result<(), OrchestrationError> {
        self.invoke("updateOrderStatus", &update.order_id, || {
            self.orders.update_order_status(update)
        })
        .await
    }

    async fn config(&self, merchant_id: &str, processor: &str) -> anyhow::Result<PaymentConfig> {
        self.configs.processor_config(merchant_id, processor).await
    }

    async fn invoke<T, F, Fut>(
        &self,
        operation: &'static str,
        order_id: &str,
        mut call: F,
    ) -> Result<T, OrchestrationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let timeout = self.options.start_to_close_timeout();
        let started = Instant::now();

        outgoing!(level = DEBUG, operation, order_id, "Activity started");

        let result = self
            .options
            .retry
            .execute(operation, |attempt| {
                let pending = call();
                async move {
                    tokio::time::timeout(timeout, pending)
                        .await
                        .unwrap_or_else(|_| {
                            Err(anyhow!(
                                "attempt {attempt} timed out after {}s",
                                timeout.as_secs()
                            ))
                        })
                }
            })
            .await;

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(value) => {
                outgoing!(
                    level = DEBUG,
                    operation,
                    order_id,
                    duration_ms,
                    "Activity completed"
                );
                Ok(value)
            }
            Err(RetryFailure {
                attempts,
                last_error,
            }) => {
                let error = format!("{last_error:#}");
                outgoing!(
                    level = ERROR,
                    operation,
                    order_id,
                    attempts,
                    duration_ms,
                    error,
                    "Activity failed"
                );
                Err(OrchestrationError::ExternalCallFailed {
                    operation,
                    attempts,
                    error: last_error,
                })
            }
        }
    }
}
