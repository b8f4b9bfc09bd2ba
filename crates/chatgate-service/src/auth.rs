//! Admin authentication extractor.
//!
//! Admin requests carry two headers: `X-Admin-Key`, the shared API key, and `X-Admin-Id`, the
//! numeric identity of the operator. The key proves the request comes from a trusted
//! operator tool; the identity is checked against the allow-list by [`AdminOverride`] so that
//! every action is attributed and non-members get a clear 403.
//!
//! [`AdminOverride`]: crate::admin::AdminOverride

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use chatgate_core::UserId;

use crate::crypto::constant_time_eq;
use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the shared admin API key.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Header carrying the acting operator's user id.
pub const ADMIN_ID_HEADER: &str = "x-admin-id";

/// Admin authentication via API key plus operator identity.
#[derive(Debug, Clone, Copy)]
pub struct AdminAuth {
    /// The acting operator, checked against the allow-list per operation.
    pub admin_id: UserId,
}

impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let admin_key = parts
                .headers
                .get(ADMIN_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            // No configured key means the admin API is closed
            let expected_key = state
                .config
                .admin_api_key
                .as_ref()
                .ok_or(ApiError::Unauthorized)?;

            if !constant_time_eq(admin_key, expected_key) {
                tracing::warn!("Admin request with invalid key");
                return Err(ApiError::Unauthorized);
            }

            let raw_id = parts
                .headers
                .get(ADMIN_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            let admin_id = raw_id
                .parse::<UserId>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;

            tracing::debug!(admin_id = %admin_id, "Admin authenticated");

            Ok(AdminAuth { admin_id })
        })
    }
}
