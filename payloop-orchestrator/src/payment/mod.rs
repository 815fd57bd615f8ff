//! Payment orchestration: submit to a processor, wait for customer action if
//! the processor asks for it, and persist the outcome.

mod signal;
mod state;
mod workflow;

pub use self::{
    signal::PaymentSignals,
    state::{
        CANCELLED_MESSAGE, PaymentContext, PaymentEvent, PaymentPhase, PaymentSignal,
        PaymentState, TIMEOUT_MESSAGE,
    },
    workflow::PaymentWorkflow,
};
