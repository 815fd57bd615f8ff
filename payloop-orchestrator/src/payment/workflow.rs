use std::time::Duration;

use chrono::{DateTime, Utc};
use payloop_common::{
    OrderStatus, OrderStatusUpdate, PaymentInput, PaymentResult, error_codes, internal,
};
use tracing::instrument;

use super::{
    signal::PaymentSignals,
    state::{PaymentEvent, PaymentPhase},
};
use crate::{activities::Activities, error::OrchestrationError};

/// Drives one payment from submission to a terminal result.
///
/// Never fails: every error path is turned into a `workflow_error` result and
/// the order is marked failed.
#[derive(Debug, Clone)]
pub struct PaymentWorkflow {
    activities: Activities,
    action_timeout: Duration,
}

impl PaymentWorkflow {
    #[must_use]
    pub const fn new(activities: Activities, action_timeout: Duration) -> Self {
        Self {
            activities,
            action_timeout,
        }
    }

    /// Run a fresh orchestration. `signals` must be in the `Created` phase;
    /// signals delivered to it before the processor asks for customer action
    /// are held until then.
    #[instrument(skip_all, fields(order_id = %input.order_id))]
    pub async fn run(&self, input: &PaymentInput, signals: &PaymentSignals) -> PaymentResult {
        match self.submit(input, signals).await {
            Ok(result) => result,
            Err(error) => self.fail(input, signals, &error).await,
        }
    }

    /// Continue an orchestration from a restored snapshot.
    ///
    /// An instance that was awaiting action goes back to waiting with its
    /// original deadline; the payment is not submitted again. A resolved
    /// instance persists its recorded outcome once more and returns it.
    #[instrument(skip_all, fields(order_id = %input.order_id))]
    pub async fn resume(&self, input: &PaymentInput, signals: &PaymentSignals) -> PaymentResult {
        let phase = signals.phase();
        internal!(
            level = INFO,
            order_id = %input.order_id,
            %phase,
            "Resuming payment orchestration"
        );

        let outcome = match phase {
            PaymentPhase::Created => self.submit(input, signals).await,
            PaymentPhase::Submitting => Err(OrchestrationError::WorkflowError(
                "Orchestration was interrupted while submitting the payment; refusing to submit it twice"
                    .to_string(),
            )),
            PaymentPhase::Finalized => match signals.outcome() {
                Some(result) => self.finalize(input, result).await,
                None => Err(OrchestrationError::WorkflowError(
                    "Finalized payment has no recorded result".to_string(),
                )),
            },
            _ => self.await_action(input, signals).await,
        };

        match outcome {
            Ok(result) => result,
            Err(error) => self.fail(input, signals, &error).await,
        }
    }

    async fn submit(
        &self,
        input: &PaymentInput,
        signals: &PaymentSignals,
    ) -> Result<PaymentResult, OrchestrationError> {
        input.validate()?;

        signals.apply(PaymentEvent::Start);
        internal!(
            level = INFO,
            order_id = %input.order_id,
            processor = %input.processor,
            amount = input.amount,
            currency = %input.currency,
            "Submitting payment"
        );

        let result = self.activities.process_payment(input).await?;
        let phase = signals.apply(PaymentEvent::Submitted {
            result: result.clone(),
            at: Utc::now(),
        });

        if phase == PaymentPhase::Finalized {
            internal!(
                level = INFO,
                order_id = %input.order_id,
                status = %result.status,
                "Payment finalized by processor"
            );

            return self.finalize(input, result).await;
        }

        internal!(
            level = INFO,
            order_id = %input.order_id,
            processor_order_id = ?result.processor_order_id,
            timeout_secs = self.action_timeout.as_secs(),
            "Payment requires customer action"
        );

        self.activities
            .update_order_status(
                &OrderStatusUpdate::new(&input.order_id, OrderStatus::RequiresAction)
                    .with_processor_ids(result.processor_order_id.clone(), None),
            )
            .await?;

        self.await_action(input, signals).await
    }

    /// Persist a result the processor settled without customer action.
    async fn finalize(
        &self,
        input: &PaymentInput,
        result: PaymentResult,
    ) -> Result<PaymentResult, OrchestrationError> {
        self.activities
            .update_order_status(
                &OrderStatusUpdate::new(&input.order_id, result.status.into()).with_processor_ids(
                    result.processor_order_id.clone(),
                    result.processor_transaction_id.clone(),
                ),
            )
            .await?;

        Ok(result)
    }

    /// Wait for a signal or the deadline, whichever comes first, then persist
    /// the resolution.
    async fn await_action(
        &self,
        input: &PaymentInput,
        signals: &PaymentSignals,
    ) -> Result<PaymentResult, OrchestrationError> {
        let deadline = tokio::time::Instant::now()
            + self.remaining_wait(signals.snapshot().context.awaiting_since);

        while signals.phase() == PaymentPhase::AwaitingAction {
            tokio::select! {
                biased;

                () = signals.changed() => {}
                () = tokio::time::sleep_until(deadline) => {
                    signals.apply(PaymentEvent::DeadlineElapsed);
                }
            }
        }

        let state = signals.snapshot();
        let result = state.outcome().cloned().ok_or_else(|| {
            OrchestrationError::WorkflowError(format!(
                "Payment left awaiting action in phase {} without a result",
                state.phase
            ))
        })?;

        let update = match state.phase {
            PaymentPhase::Cancelled => {
                internal!(
                    level = INFO,
                    order_id = %input.order_id,
                    reason = %OrchestrationError::OrchestrationCancelled,
                    "Payment cancelled"
                );
                OrderStatusUpdate::new(&input.order_id, OrderStatus::Cancelled)
            }
            PaymentPhase::TimedOut => {
                let reason =
                    OrchestrationError::OrchestrationTimeout(self.action_timeout.as_secs());
                internal!(
                    level = WARN,
                    order_id = %input.order_id,
                    %reason,
                    "Payment timed out"
                );
                OrderStatusUpdate::new(&input.order_id, OrderStatus::Failed)
            }
            phase => {
                internal!(
                    level = INFO,
                    order_id = %input.order_id,
                    %phase,
                    transaction_id = ?result.processor_transaction_id,
                    "Payment action completed"
                );
                OrderStatusUpdate::new(&input.order_id, result.status.into()).with_processor_ids(
                    state.context.processor_order_id.clone(),
                    result.processor_transaction_id.clone(),
                )
            }
        };

        self.activities.update_order_status(&update).await?;

        Ok(result)
    }

    /// Time left before the action deadline, counted from when the wait began.
    fn remaining_wait(&self, awaiting_since: Option<DateTime<Utc>>) -> Duration {
        let elapsed = awaiting_since
            .and_then(|since| (Utc::now() - since).to_std().ok())
            .unwrap_or_default();

        self.action_timeout.saturating_sub(elapsed)
    }

    pub(crate) async fn fail(
        &self,
        input: &PaymentInput,
        signals: &PaymentSignals,
        error: &OrchestrationError,
    ) -> PaymentResult {
        let message = error.to_string();
        internal!(
            level = ERROR,
            order_id = %input.order_id,
            error = %message,
            "Payment orchestration failed"
        );

        signals.apply(PaymentEvent::Error(message.clone()));

        if !input.order_id.trim().is_empty()
            && let Err(update_error) = self
                .activities
                .update_order_status(&OrderStatusUpdate::new(
                    &input.order_id,
                    OrderStatus::Failed,
                ))
                .await
        {
            internal!(
                level = ERROR,
                order_id = %input.order_id,
                error = %update_error,
                "Unable to mark order failed"
            );
        }

        PaymentResult::failure(error_codes::WORKFLOW_ERROR, message)
    }
}
