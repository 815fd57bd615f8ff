use std::sync::Arc;

use parking_lot::Mutex;
use payloop_common::{PaymentResult, incoming};
use tokio::sync::Notify;

use super::state::{PaymentEvent, PaymentPhase, PaymentSignal, PaymentState};

/// Shared handle onto one payment orchestration's state.
///
/// Both the running workflow and whoever delivers signals hold a clone. Every
/// change goes through [`PaymentState::apply`] while the lock is held, and the
/// lock is never held across an `.await`.
#[derive(Debug, Clone)]
pub struct PaymentSignals {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    order_id: String,
    state: Mutex<PaymentState>,
    changed: Notify,
}

impl PaymentSignals {
    #[must_use]
    pub fn new(order_id: impl Into<String>) -> Self {
        Self::restore(order_id, PaymentState::new())
    }

    /// Continue from a previously taken [`snapshot`](Self::snapshot).
    #[must_use]
    pub fn restore(order_id: impl Into<String>, state: PaymentState) -> Self {
        Self {
            inner: Arc::new(Inner {
                order_id: order_id.into(),
                state: Mutex::new(state),
                changed: Notify::new(),
            }),
        }
    }

    #[must_use]
    pub fn order_id(&self) -> &str {
        &self.inner.order_id
    }

    /// Deliver a "payment completed" signal.
    pub fn complete(
        &self,
        success: bool,
        processor_transaction_id: Option<String>,
    ) -> PaymentPhase {
        self.deliver(PaymentSignal::Completed {
            success,
            processor_transaction_id,
        })
    }

    /// Deliver a "payment cancelled" signal.
    pub fn cancel(&self) -> PaymentPhase {
        self.deliver(PaymentSignal::Cancelled)
    }

    pub fn deliver(&self, signal: PaymentSignal) -> PaymentPhase {
        let order_id = self.order_id();
        let (before, after) = {
            let mut state = self.inner.state.lock();
            let before = state.phase;
            (before, state.apply(PaymentEvent::Signal(signal.clone())))
        };

        match (before, after) {
            (PaymentPhase::Created | PaymentPhase::Submitting, _) => {
                incoming!(
                    level = DEBUG,
                    order_id,
                    phase = %before,
                    ?signal,
                    "Signal buffered until payment awaits action"
                );
            }
            (before, after) if before == after => {
                incoming!(
                    level = DEBUG,
                    order_id,
                    phase = %before,
                    ?signal,
                    "Signal ignored"
                );
            }
            _ => {
                incoming!(
                    level = INFO,
                    order_id,
                    %before,
                    %after,
                    ?signal,
                    "Signal applied"
                );
            }
        }

        self.inner.changed.notify_one();
        after
    }

    /// Feed a workflow-driven event through the state machine.
    pub(crate) fn apply(&self, event: PaymentEvent) -> PaymentPhase {
        let phase = self.inner.state.lock().apply(event);
        self.inner.changed.notify_one();
        phase
    }

    /// Resolves after the next state change. A change that happened while
    /// nobody was waiting is not lost.
    pub(crate) async fn changed(&self) {
        self.inner.changed.notified().await;
    }

    #[must_use]
    pub fn phase(&self) -> PaymentPhase {
        self.inner.state.lock().phase
    }

    #[must_use]
    pub fn snapshot(&self) -> PaymentState {
        self.inner.state.lock().clone()
    }

    #[must_use]
    pub fn outcome(&self) -> Option<PaymentResult> {
        self.inner.state.lock().outcome().cloned()
    }
}
