//! Payment data model shared between the orchestrators and processors.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Error codes placed in [`PaymentResult::error_code`] by the orchestrator itself.
pub mod error_codes {
    pub const CANCELLED: &str = "cancelled";
    pub const TIMEOUT: &str = "timeout";
    pub const WORKFLOW_ERROR: &str = "workflow_error";
}

/// Status reported by a processor for a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Authorized,
    Captured,
    Failed,
    Pending,
    RequiresAction,
}

impl PaymentStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authorized => "authorized",
            Self::Captured => "captured",
            Self::Failed => "failed",
            Self::Pending => "pending",
            Self::RequiresAction => "requires_action",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted order status. A superset of [`PaymentStatus`]: orders can also be
/// cancelled, which is never a processor outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Authorized,
    Captured,
    Failed,
    RequiresAction,
    Cancelled,
}

impl OrderStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authorized => "authorized",
            Self::Captured => "captured",
            Self::Failed => "failed",
            Self::RequiresAction => "requires_action",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<PaymentStatus> for OrderStatus {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Authorized => Self::Authorized,
            PaymentStatus::Captured => Self::Captured,
            PaymentStatus::Failed => Self::Failed,
            PaymentStatus::Pending => Self::Pending,
            PaymentStatus::RequiresAction => Self::RequiresAction,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodKind {
    Card,
    Upi,
    Netbanking,
    Wallet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    #[serde(rename = "type")]
    pub kind: PaymentMethodKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Everything needed to take one payment for one order.
///
/// Immutable once an orchestration has started with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInput {
    pub order_id: String,
    pub merchant_id: String,
    /// Minor currency units (cents, paise, ...)
    pub amount: u64,
    pub currency: String,
    pub processor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl PaymentInput {
    /// A minimal input; optional descriptors can be filled in afterwards.
    #[must_use]
    pub fn new(
        order_id: impl Into<String>,
        merchant_id: impl Into<String>,
        amount: u64,
        currency: impl Into<String>,
        processor: impl Into<String>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            merchant_id: merchant_id.into(),
            amount,
            currency: currency.into(),
            processor: processor.into(),
            return_url: None,
            cancel_url: None,
            customer: None,
            payment_method: None,
            metadata: None,
        }
    }

    /// Check the invariants the orchestrator relies on.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.order_id.trim().is_empty() {
            return Err(ValidationError::MissingField("orderId"));
        }
        if self.merchant_id.trim().is_empty() {
            return Err(ValidationError::MissingField("merchantId"));
        }
        if self.processor.trim().is_empty() {
            return Err(ValidationError::MissingField("processor"));
        }
        if self.amount == 0 {
            return Err(ValidationError::ZeroAmount);
        }
        if self.currency.len() != 3 || !self.currency.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(ValidationError::InvalidCurrency(self.currency.clone()));
        }

        Ok(())
    }
}

/// Outcome of a processor call, and the terminal value of a payment orchestration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    pub success: bool,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl PaymentResult {
    /// A result carrying only a status; `success` is derived from it.
    #[must_use]
    pub const fn with_status(status: PaymentStatus) -> Self {
        Self {
            success: !matches!(status, PaymentStatus::Failed),
            status,
            processor_order_id: None,
            processor_transaction_id: None,
            redirect_url: None,
            error_code: None,
            error_message: None,
            metadata: None,
        }
    }

    /// A failed result with an error code and message.
    #[must_use]
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: Some(code.into()),
            error_message: Some(message.into()),
            ..Self::with_status(PaymentStatus::Failed)
        }
    }

    #[must_use]
    pub fn is_requires_action(&self) -> bool {
        self.status == PaymentStatus::RequiresAction
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundInput {
    pub order_id: String,
    pub transaction_id: String,
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_id: Option<String>,
    pub status: RefundStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Per-merchant processor settings handed to every processor call.
///
/// Credentials arrive already decrypted; decryption belongs to whoever
/// provides the config.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfig {
    pub merchant_id: String,
    pub processor: String,
    #[serde(default = "default_test_mode")]
    pub test_mode: bool,
    #[serde(default)]
    pub credentials: HashMap<String, String>,
}

const fn default_test_mode() -> bool {
    true
}

impl fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.credentials.keys().collect();
        keys.sort();

        f.debug_struct("PaymentConfig")
            .field("merchant_id", &self.merchant_id)
            .field("processor", &self.processor)
            .field("test_mode", &self.test_mode)
            .field("credentials", &format_args!("<redacted: {keys:?}>"))
            .finish()
    }
}

/// A request to move a persisted order to a new status.
///
/// The order store treats repeated identical updates as idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusUpdate {
    pub order_id: String,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_transaction_id: Option<String>,
}

impl OrderStatusUpdate {
    #[must_use]
    pub fn new(order_id: impl Into<String>, status: OrderStatus) -> Self {
        Self {
            order_id: order_id.into(),
            status,
            processor_order_id: None,
            processor_transaction_id: None,
        }
    }

    #[must_use]
    pub fn with_processor_ids(
        mut self,
        processor_order_id: Option<String>,
        processor_transaction_id: Option<String>,
    ) -> Self {
        self.processor_order_id = processor_order_id;
        self.processor_transaction_id = processor_transaction_id;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn input() -> PaymentInput {
        PaymentInput::new("ord_1", "mer_1", 1999, "USD", "stripe")
    }

    #[test]
    fn test_validate_accepts_well_formed_input() {
        assert_eq!(input().validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let mut bad = input();
        bad.order_id = String::new();
        assert_eq!(bad.validate(), Err(ValidationError::MissingField("orderId")));

        let mut bad = input();
        bad.processor = "  ".to_string();
        assert_eq!(
            bad.validate(),
            Err(ValidationError::MissingField("processor"))
        );

        let mut bad = input();
        bad.amount = 0;
        assert_eq!(bad.validate(), Err(ValidationError::ZeroAmount));

        for currency in ["usd", "US", "USDT", "U$D"] {
            let mut bad = input();
            bad.currency = currency.to_string();
            assert_eq!(
                bad.validate(),
                Err(ValidationError::InvalidCurrency(currency.to_string()))
            );
        }
    }

    #[test]
    fn test_payment_input_wire_names() {
        let json = r#"{
            "orderId": "ord_1",
            "merchantId": "mer_1",
            "amount": 500,
            "currency": "INR",
            "processor": "razorpay",
            "returnUrl": "https://shop.example/return",
            "paymentMethod": { "type": "upi" },
            "metadata": { "cart": 42 }
        }"#;

        let parsed: PaymentInput = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.order_id, "ord_1");
        assert_eq!(
            parsed.return_url.as_deref(),
            Some("https://shop.example/return")
        );
        assert_eq!(
            parsed.payment_method,
            Some(PaymentMethod {
                kind: PaymentMethodKind::Upi,
                token: None,
            })
        );
        assert_eq!(parsed.metadata.unwrap()["cart"], 42);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&PaymentStatus::RequiresAction).unwrap(),
            "\"requires_action\""
        );
        assert_eq!(OrderStatus::from(PaymentStatus::Captured), OrderStatus::Captured);
        assert_eq!(OrderStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_failure_result() {
        let result = PaymentResult::failure(error_codes::TIMEOUT, "Payment timeout");
        assert!(!result.success);
        assert_eq!(result.status, PaymentStatus::Failed);
        assert_eq!(result.error_code.as_deref(), Some("timeout"));

        assert!(PaymentResult::with_status(PaymentStatus::Pending).success);
    }

    #[test]
    fn test_payment_config_debug_redacts_credentials() {
        let config = PaymentConfig {
            merchant_id: "mer_1".to_string(),
            processor: "stripe".to_string(),
            test_mode: true,
            credentials: HashMap::from([("secret_key".to_string(), "sk_live_abc".to_string())]),
        };

        let debug = format!("{config:?}");
        assert!(debug.contains("secret_key"));
        assert!(!debug.contains("sk_live_abc"));
    }
}
