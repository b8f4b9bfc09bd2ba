//! Health check handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use chatgate_core::PaymentMode;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
    /// Whether new payments go through the processor or are created offline.
    pub payments: PaymentMode,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let payments = if state.has_processor() {
        PaymentMode::Live
    } else {
        PaymentMode::Offline
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        service: "chatgate".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        payments,
    })
}
