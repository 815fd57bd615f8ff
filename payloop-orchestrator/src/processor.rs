//! The capability set every payment processor implements.

use async_trait::async_trait;
use payloop_common::{PaymentConfig, PaymentInput, PaymentResult, RefundResult};

/// A payment processor integration (card network, UPI, wallet, ...).
///
/// Implementations are opaque to the orchestrator. Any method may fail; the
/// call layer retries failures according to its retry policy, so
/// implementations should not retry internally.
#[async_trait]
pub trait PaymentProcessor: Send + Sync + std::fmt::Debug {
    /// Name the processor registers under.
    fn name(&self) -> &str;

    async fn create_payment(
        &self,
        input: &PaymentInput,
        config: &PaymentConfig,
    ) -> anyhow::Result<PaymentResult>;

    async fn capture_payment(
        &self,
        processor_order_id: &str,
        amount: u64,
        config: &PaymentConfig,
    ) -> anyhow::Result<PaymentResult>;

    async fn refund_payment(
        &self,
        processor_transaction_id: &str,
        amount: u64,
        config: &PaymentConfig,
    ) -> anyhow::Result<RefundResult>;

    async fn get_payment_status(
        &self,
        processor_order_id: &str,
        config: &PaymentConfig,
    ) -> anyhow::Result<PaymentResult>;
}
