//! Payment processor webhook handler.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use crate::crypto::{verify_signature, SIGNATURE_HEADER};
use crate::error::ApiError;
use crate::reconciler::{WebhookEvent, WebhookOutcome};
use crate::state::AppState;

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was accepted.
    pub received: bool,
    /// What the notification did.
    pub outcome: WebhookOutcome,
}

/// Handle YooKassa payment notifications.
///
/// Unknown payments and non-actionable events are acknowledged with 200 so the processor
/// does not keep redelivering them.
pub async fn yookassa_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    if let Some(secret) = &state.config.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());

        verify_signature(secret, body.as_bytes(), signature).map_err(|e| {
            tracing::warn!(error = %e, "Invalid webhook signature");
            ApiError::BadRequest("Invalid webhook signature".into())
        })?;
    } else {
        tracing::debug!("Webhook secret not configured - skipping signature verification");
    }

    let event: WebhookEvent = serde_json::from_str(&body)
        .map_err(|e| ApiError::BadRequest(format!("malformed notification: {e}")))?;

    tracing::info!(
        event = %event.event,
        external_id = %event.object.id,
        status = %event.object.status,
        "Received payment notification"
    );

    let outcome = state.reconciler.handle_webhook(&event).await?;

    Ok(Json(WebhookResponse {
        received: true,
        outcome,
    }))
}
