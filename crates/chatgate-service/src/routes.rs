//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, health, webhooks};
use crate::state::AppState;

/// Maximum concurrent requests for admin endpoints.
const ADMIN_MAX_CONCURRENT_REQUESTS: usize = 16;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Webhooks (optional signature verification)
/// - `POST /webhooks/yookassa` - Payment notifications
///
/// ## Admin (`X-Admin-Key` + allow-listed `X-Admin-Id`, concurrency-limited)
/// - `POST /v1/admin/grant` - Grant premium for N days
/// - `POST /v1/admin/revoke` - Revoke premium
/// - `POST /v1/admin/reset-counter` - Reset a daily counter
/// - `GET /v1/admin/users` - List users with tier and today's usage
/// - `GET /v1/admin/users/:user_id` - Inspect a user
/// - `GET /v1/admin/payments/:id` - Find a payment by either id
/// - `POST /v1/admin/payments/:id/check` - Poll the processor
/// - `POST /v1/admin/payments/:id/complete` - Complete manually
/// - `GET /v1/admin/stats` - Accounts per tier and open payments
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let admin_routes = Router::new()
        .route("/grant", post(admin::grant))
        .route("/revoke", post(admin::revoke))
        .route("/reset-counter", post(admin::reset_counter))
        .route("/users", get(admin::list_users))
        .route("/users/:user_id", get(admin::inspect_user))
        .route("/payments/:id", get(admin::find_payment))
        .route("/payments/:id/check", post(admin::check_payment))
        .route("/payments/:id/complete", post(admin::complete_payment))
        .route("/stats", get(admin::stats))
        .layer(ConcurrencyLimitLayer::new(ADMIN_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // Admin API (rate limited)
        .nest("/v1/admin", admin_routes)
        // Webhooks (no rate limit - controlled by the processor)
        .route("/webhooks/yookassa", post(webhooks::yookassa_webhook))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
