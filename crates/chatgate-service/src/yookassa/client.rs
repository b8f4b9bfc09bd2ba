//! YooKassa API client implementation.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use chatgate_core::{format_minor, PaymentStatus};

use super::types::{
    Amount, ApiErrorBody, ConfirmationRequest, CreatePaymentBody, PaymentObject,
};
use crate::processor::{CreatePaymentRequest, PaymentProcessor, ProcessorError, ProcessorPayment};

/// YooKassa API client.
#[derive(Debug, Clone)]
pub struct YooKassaClient {
    client: Client,
    base_url: String,
    shop_id: String,
    secret_key: String,
}

impl YooKassaClient {
    /// YooKassa API base URL.
    pub const BASE_URL: &'static str = "https://api.yookassa.ru/v3";

    /// Create a new client against the production API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        shop_id: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProcessorError> {
        Self::with_base_url(Self::BASE_URL, shop_id, secret_key, timeout)
    }

    /// Create a new client against an arbitrary base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_base_url(
        base_url: impl Into<String>,
        shop_id: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProcessorError> {
        let shop_id = shop_id.into();
        let secret_key = secret_key.into();
        if shop_id.is_empty() || secret_key.is_empty() {
            return Err(ProcessorError::Configuration(
                "shop id and secret key are required".into(),
            ));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            shop_id,
            secret_key,
        })
    }

    /// Handle API response and convert errors.
    async fn handle_response(
        &self,
        response: reqwest::Response,
    ) -> Result<ProcessorPayment, ProcessorError> {
        let status = response.status();

        if status.is_success() {
            let object: PaymentObject = response.json().await?;
            return to_processor_payment(object);
        }

        let error_body: Result<ApiErrorBody, _> = response.json().await;

        match error_body {
            Ok(body) => Err(ProcessorError::Api {
                status: status.as_u16(),
                code: body.code,
                description: body.description,
            }),
            Err(_) => Err(ProcessorError::Api {
                status: status.as_u16(),
                code: "unknown".to_string(),
                description: format!("HTTP {status}"),
            }),
        }
    }
}

fn to_processor_payment(object: PaymentObject) -> Result<ProcessorPayment, ProcessorError> {
    let status = PaymentStatus::from_processor(&object.status)
        .map_err(|_| ProcessorError::UnexpectedStatus(object.status.clone()))?;

    Ok(ProcessorPayment {
        id: object.id,
        status,
        confirmation_url: object.confirmation.and_then(|c| c.confirmation_url),
    })
}

#[async_trait]
impl PaymentProcessor for YooKassaClient {
    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<ProcessorPayment, ProcessorError> {
        let body = CreatePaymentBody {
            amount: Amount {
                value: format_minor(request.amount_minor),
                currency: request.currency.clone(),
            },
            confirmation: ConfirmationRequest {
                kind: "redirect",
                return_url: request.return_url.clone(),
            },
            capture: true,
            description: request.description.clone(),
            metadata: serde_json::to_value(&request.metadata)
                .map_err(|e| ProcessorError::Configuration(e.to_string()))?,
        };

        tracing::debug!(
            local_id = %request.metadata.local_id,
            user_id = %request.metadata.user_id,
            amount = %body.amount.value,
            "Creating YooKassa payment"
        );

        let response = self
            .client
            .post(format!("{}/payments", self.base_url))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .header("Idempotence-Key", &request.idempotence_key)
            .json(&body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn fetch_payment(&self, external_id: &str) -> Result<ProcessorPayment, ProcessorError> {
        let response = self
            .client
            .get(format!("{}/payments/{}", self.base_url, external_id))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ProcessorError::NotFound(external_id.to_string()));
        }

        self.handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credentials_are_rejected() {
        let err = YooKassaClient::new("", "secret", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ProcessorError::Configuration(_)));
    }

    #[test]
    fn waiting_for_capture_maps_to_waiting_confirmation() {
        let object: PaymentObject = serde_json::from_value(serde_json::json!({
            "id": "2d2b4f2a-000f-5000-9000-1b7c1ad4e1a1",
            "status": "waiting_for_capture",
            "paid": true
        }))
        .unwrap();
        let payment = to_processor_payment(object).unwrap();
        assert_eq!(payment.status, PaymentStatus::WaitingConfirmation);
        assert_eq!(payment.confirmation_url, None);
    }

    #[test]
    fn unknown_status_is_an_error() {
        let object: PaymentObject = serde_json::from_value(serde_json::json!({
            "id": "x",
            "status": "refunded"
        }))
        .unwrap();
        assert!(matches!(
            to_processor_payment(object),
            Err(ProcessorError::UnexpectedStatus(_))
        ));
    }
}
