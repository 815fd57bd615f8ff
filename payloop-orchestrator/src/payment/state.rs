//! Payment orchestration state machine.
//!
//! ```text
//! Created -> Submitting -> Finalized
//!                       -> AwaitingAction -> Completed | Failed | Cancelled | TimedOut
//! ```
//!
//! `Error` moves any phase to `Failed`.

use std::fmt;

use chrono::{DateTime, Utc};
use payloop_common::{
    PaymentResult, PaymentStatus, error_codes, traits::fsm::FiniteStateMachine,
};
use serde::{Deserialize, Serialize};

pub const CANCELLED_MESSAGE: &str = "Payment cancelled";
pub const TIMEOUT_MESSAGE: &str = "Payment timeout";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPhase {
    #[default]
    Created,
    Submitting,
    Finalized,
    AwaitingAction,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl PaymentPhase {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Created | Self::Submitting | Self::AwaitingAction)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Submitting => "submitting",
            Self::Finalized => "finalized",
            Self::AwaitingAction => "awaiting_action",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
        }
    }

    fn advance(self, event: PaymentEvent, context: &mut PaymentContext) -> Self {
        match (self, event) {
            (_, PaymentEvent::Error(message)) => {
                context.result = Some(PaymentResult::failure(
                    error_codes::WORKFLOW_ERROR,
                    message,
                ));
                Self::Failed
            }

            (Self::Created, PaymentEvent::Start) => Self::Submitting,

            (Self::Submitting, PaymentEvent::Submitted { result, at }) => {
                if result.is_requires_action() {
                    context.processor_order_id.clone_from(&result.processor_order_id);
                    context.awaiting_since = Some(at);
                    context.result = Some(result);

                    match context.buffered_signal.take() {
                        Some(signal) => Self::AwaitingAction.resolve(signal, context),
                        None => Self::AwaitingAction,
                    }
                } else {
                    context.buffered_signal = None;
                    context.processor_order_id.clone_from(&result.processor_order_id);
                    context.result = Some(result);
                    Self::Finalized
                }
            }

            (Self::Created | Self::Submitting, PaymentEvent::Signal(signal)) => {
                if context.buffered_signal.is_none() {
                    context.buffered_signal = Some(signal);
                }
                self
            }

            (Self::AwaitingAction, PaymentEvent::Signal(signal)) => self.resolve(signal, context),

            (Self::AwaitingAction, PaymentEvent::DeadlineElapsed) => {
                context.result = Some(PaymentResult::failure(
                    error_codes::TIMEOUT,
                    TIMEOUT_MESSAGE,
                ));
                Self::TimedOut
            }

            (phase, _) => phase,
        }
    }

    fn resolve(self, signal: PaymentSignal, context: &mut PaymentContext) -> Self {
        match signal {
            PaymentSignal::Completed {
                success,
                processor_transaction_id,
            } => {
                let status = if success {
                    PaymentStatus::Captured
                } else {
                    PaymentStatus::Failed
                };

                // The processor order id stays in the context for the order
                // update; the completion result only carries the transaction.
                context.result = Some(PaymentResult {
                    processor_transaction_id,
                    ..PaymentResult::with_status(status)
                });

                if success { Self::Completed } else { Self::Failed }
            }
            PaymentSignal::Cancelled => {
                context.result = Some(PaymentResult::failure(
                    error_codes::CANCELLED,
                    CANCELLED_MESSAGE,
                ));
                Self::Cancelled
            }
        }
    }
}

impl fmt::Display for PaymentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External signals a running payment orchestration accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "camelCase")]
pub enum PaymentSignal {
    /// The customer finished (or abandoned) the required action.
    #[serde(rename_all = "camelCase")]
    Completed {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        processor_transaction_id: Option<String>,
    },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEvent {
    Start,
    /// The processor answered `createPayment`.
    Submitted {
        result: PaymentResult,
        at: DateTime<Utc>,
    },
    Signal(PaymentSignal),
    DeadlineElapsed,
    /// Anything that went wrong outside the processor's answer.
    Error(String),
}

/// Data carried alongside the phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentContext {
    /// Terminal result once resolved; the processor's answer while awaiting action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<PaymentResult>,

    /// First signal received before the orchestration started waiting for one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffered_signal: Option<PaymentSignal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_order_id: Option<String>,

    /// When `AwaitingAction` was entered; the action deadline counts from here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awaiting_since: Option<DateTime<Utc>>,
}

impl FiniteStateMachine for PaymentPhase {
    type Input = PaymentEvent;
    type Context = PaymentContext;

    fn transition(self, input: Self::Input, context: &mut Self::Context) -> Self {
        self.advance(input, context)
    }
}

/// Snapshot of one payment orchestration. Serializable so a host can persist
/// it and [`resume`](super::PaymentWorkflow::resume) later.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentState {
    pub phase: PaymentPhase,
    pub context: PaymentContext,
}

impl PaymentState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed `event` through the state machine and return the new phase.
    pub fn apply(&mut self, event: PaymentEvent) -> PaymentPhase {
        self.phase = self.phase.transition(event, &mut self.context);
        self.phase
    }

    /// The terminal result, if the orchestration has resolved.
    #[must_use]
    pub fn outcome(&self) -> Option<&PaymentResult> {
        if self.phase.is_terminal() {
            self.context.result.as_ref()
        } else {
            None
        }
    }
}
