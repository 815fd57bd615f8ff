//! Typed error handling for orchestration.
//!
//! Errors fall into two groups:
//! - Configuration defects (duplicate or unknown processors, invalid input) -
//!   reported immediately, never retried
//! - External call failures - retried by the retry policy and only surfaced
//!   once the attempt ceiling is reached

use std::path::PathBuf;

use payloop_common::ValidationError;
use thiserror::Error;

/// Errors raised by the [`ProcessorRegistry`](crate::ProcessorRegistry).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A processor with this name has already been registered.
    #[error("Processor {0} is already registered")]
    DuplicateProcessor(String),

    /// No processor with this name exists.
    #[error("Processor {name} not found. Available: {}", available.join(", "))]
    ProcessorNotFound {
        name: String,
        available: Vec<String>,
    },
}

/// Errors produced while driving an orchestration instance.
///
/// Instances never return these to their caller directly: each is normalised
/// into a `PaymentResult` or `WebhookDeliveryResult` at the instance boundary.
/// The runtime surfaces them for operations that address instances.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Invalid payment input: {0}")]
    InvalidInput(#[from] ValidationError),

    /// A processor, store, or transport call failed on every permitted attempt.
    #[error("{operation} failed after {attempts} attempt(s): {error:#}")]
    ExternalCallFailed {
        operation: &'static str,
        attempts: u32,
        error: anyhow::Error,
    },

    /// The deadline elapsed while waiting for an external action.
    #[error("Timed out after {0} seconds awaiting payment action")]
    OrchestrationTimeout(u64),

    /// A cancellation signal ended the orchestration.
    #[error("Orchestration cancelled")]
    OrchestrationCancelled,

    /// An instance for this id is still running.
    #[error("Workflow {0} is already running")]
    WorkflowAlreadyStarted(String),

    /// No running instance has this id.
    #[error("Workflow {0} not found")]
    WorkflowNotFound(String),

    /// Anything else that went wrong inside an instance.
    #[error("Workflow error: {0}")]
    WorkflowError(String),
}

impl OrchestrationError {
    /// Returns `true` if the error points at deployment or input configuration
    /// rather than a transient condition.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Registry(_) | Self::InvalidInput(_))
    }

    /// Returns `true` if a retry of the same call could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ExternalCallFailed { .. })
    }
}

/// Errors loading [`OrchestratorConfig`](crate::OrchestratorConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PAYLOOP_CONFIG points to non-existent file: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Failed to read config from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_lists_available_processors() {
        let error = RegistryError::ProcessorNotFound {
            name: "paypal".to_string(),
            available: vec!["razorpay".to_string(), "stripe".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "Processor paypal not found. Available: razorpay, stripe"
        );
    }

    #[test]
    fn test_error_classification() {
        let error: OrchestrationError =
            RegistryError::DuplicateProcessor("stripe".to_string()).into();
        assert!(error.is_configuration());
        assert!(!error.is_retryable());
        assert_eq!(error.to_string(), "Processor stripe is already registered");

        let error: OrchestrationError = ValidationError::ZeroAmount.into();
        assert!(error.is_configuration());

        let error = OrchestrationError::ExternalCallFailed {
            operation: "createPayment",
            attempts: 5,
            error: anyhow::anyhow!("connection reset"),
        };
        assert!(error.is_retryable());
        assert!(!error.is_configuration());
        assert_eq!(
            error.to_string(),
            "createPayment failed after 5 attempt(s): connection reset"
        );
    }
}
