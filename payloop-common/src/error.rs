//! Error types shared by every payloop crate.

use thiserror::Error;

/// Reasons a [`PaymentInput`](crate::PaymentInput) is refused before any
/// orchestration starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required identifier is empty.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Amounts are in minor units and must be positive.
    #[error("Amount must be greater than zero")]
    ZeroAmount,

    /// Currency is not an ISO 4217 style three letter code.
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),
}
