//! YooKassa API wire types.

use serde::{Deserialize, Serialize};

/// Money amount as the API expects it: a decimal string and a currency code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    /// Decimal value, e.g. `"139.00"`.
    pub value: String,
    /// ISO currency code.
    pub currency: String,
}

/// Confirmation settings on create.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationRequest {
    /// Confirmation type; always `redirect`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Where to return the user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
}

/// Body of `POST /v3/payments`.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePaymentBody {
    /// Amount to charge.
    pub amount: Amount,
    /// Confirmation settings.
    pub confirmation: ConfirmationRequest,
    /// Capture immediately on payment.
    pub capture: bool,
    /// Description shown to the payer.
    pub description: String,
    /// Metadata echoed back in notifications.
    pub metadata: serde_json::Value,
}

/// Confirmation details in a payment response.
#[derive(Debug, Clone, Deserialize)]
pub struct Confirmation {
    /// Confirmation type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Redirect URL for the payer.
    #[serde(default)]
    pub confirmation_url: Option<String>,
}

/// A payment object as returned by the API and embedded in notifications.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentObject {
    /// Processor payment id.
    pub id: String,
    /// Processor status string.
    pub status: String,
    /// Whether the payment has been paid.
    #[serde(default)]
    pub paid: bool,
    /// Amount.
    #[serde(default)]
    pub amount: Option<Amount>,
    /// Confirmation details.
    #[serde(default)]
    pub confirmation: Option<Confirmation>,
    /// Metadata set on create.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Error body returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Error code, e.g. `invalid_credentials`.
    #[serde(default)]
    pub code: String,
    /// Description.
    #[serde(default)]
    pub description: String,
}
