//! Payment processor interface.
//!
//! The engine only needs two calls from a processor: create a payment and fetch its
//! current status. [`crate::yookassa::YooKassaClient`] implements them over HTTP.

use async_trait::async_trait;
use serde::Serialize;

use chatgate_core::{PaymentId, PaymentStatus, PlanId, UserId};

/// Error type for payment processor operations.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// HTTP request failed (includes timeouts).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The processor rejected the request.
    #[error("processor API error ({status}): {code} - {description}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Processor error code.
        code: String,
        /// Human-readable description.
        description: String,
    },

    /// The processor does not know this payment.
    #[error("payment not found at processor: {0}")]
    NotFound(String),

    /// The processor reported a status outside its documented vocabulary.
    #[error("unexpected payment status: {0}")]
    UnexpectedStatus(String),

    /// Client misconfiguration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Values attached to a processor payment so it can be traced back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentMetadata {
    /// Local payment id.
    pub local_id: PaymentId,
    /// Paying user.
    pub user_id: UserId,
    /// Purchased plan.
    pub plan_id: PlanId,
    /// Premium days the plan grants.
    pub days: u32,
}

/// A request to create a payment at the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePaymentRequest {
    /// Idempotence key; the local payment id.
    pub idempotence_key: String,
    /// Amount in minor currency units.
    pub amount_minor: i64,
    /// ISO currency code.
    pub currency: String,
    /// Description shown on the payment page.
    pub description: String,
    /// Where to send the user after paying.
    pub return_url: Option<String>,
    /// Traceability metadata.
    pub metadata: PaymentMetadata,
}

/// The processor's view of a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorPayment {
    /// Processor payment id.
    pub id: String,
    /// Status mapped to the local vocabulary.
    pub status: PaymentStatus,
    /// Where the user completes the payment.
    pub confirmation_url: Option<String>,
}

/// A payment processor.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Create a payment.
    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<ProcessorPayment, ProcessorError>;

    /// Fetch the current state of a payment.
    async fn fetch_payment(&self, external_id: &str) -> Result<ProcessorPayment, ProcessorError>;
}
