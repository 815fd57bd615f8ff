//! Payment and webhook delivery orchestration.
//!
//! - [`ProcessorRegistry`] maps processor names to [`PaymentProcessor`]
//!   implementations
//! - [`Activities`] runs every external call under a [`RetryPolicy`]
//! - [`PaymentWorkflow`] drives one payment through its state machine
//! - [`WebhookDelivery`] pushes one webhook event to a merchant endpoint
//! - [`Orchestrator`] runs instances of both and routes signals to them

pub mod activities;
pub mod config;
pub mod error;
pub mod memory;
pub mod payment;
pub mod policy;
pub mod ports;
pub mod processor;
pub mod registry;
pub mod runtime;
pub mod webhook;

pub use self::{
    activities::Activities,
    config::{OrchestratorConfig, PaymentOptions},
    error::{ConfigError, OrchestrationError, RegistryError},
    payment::{PaymentPhase, PaymentSignal, PaymentSignals, PaymentState, PaymentWorkflow},
    policy::{ActivityOptions, RetryFailure, RetryPolicy},
    processor::PaymentProcessor,
    registry::ProcessorRegistry,
    runtime::{
        Collaborators, Orchestrator, PaymentHandle, WebhookHandle, payment_instance_id,
        webhook_instance_id,
    },
    webhook::{WebhookDelivery, WebhookOptions},
};
