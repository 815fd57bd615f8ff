pub mod error;
pub mod logging;
pub mod payment;
pub mod traits;
pub mod webhook;

pub use tracing;

pub use self::{
    error::ValidationError,
    payment::{
        Customer, OrderStatus, OrderStatusUpdate, PaymentConfig, PaymentInput, PaymentMethod,
        PaymentMethodKind, PaymentResult, PaymentStatus, RefundInput, RefundResult, RefundStatus,
        error_codes,
    },
    webhook::{WebhookAttempt, WebhookDeliveryInput, WebhookDeliveryResult},
};
