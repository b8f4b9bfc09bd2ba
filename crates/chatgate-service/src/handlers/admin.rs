//! Admin API handlers.
//!
//! Thin wrappers over [`AdminOverride`](crate::admin::AdminOverride); the allow-list check
//! happens there.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use chatgate_core::{parse_day, AccountStatus, GateError, Payment, UserId};

use crate::admin::{AdminStats, UserReport, UserSummary, MAX_USER_LIST};
use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::reconciler::PollOutcome;
use crate::state::AppState;

/// Request to grant premium.
#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    /// Target user.
    pub user_id: UserId,
    /// Premium days from now.
    pub days: u32,
}

/// Request naming a user.
#[derive(Debug, Deserialize)]
pub struct UserRequest {
    /// Target user.
    pub user_id: UserId,
}

/// Request to reset a daily counter.
#[derive(Debug, Deserialize)]
pub struct ResetCounterRequest {
    /// Target user.
    pub user_id: UserId,
    /// `YYYY-MM-DD`; defaults to today (UTC).
    #[serde(default)]
    pub day: Option<String>,
}

/// Response for a counter reset.
#[derive(Debug, Serialize)]
pub struct ResetCounterResponse {
    /// Target user.
    pub user_id: UserId,
    /// The day that was reset, if given.
    pub day: Option<NaiveDate>,
    /// Whether a counter existed.
    pub existed: bool,
}

/// Query for the user listing.
#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    /// Maximum accounts to read.
    #[serde(default = "default_user_limit")]
    pub limit: usize,
}

const fn default_user_limit() -> usize {
    MAX_USER_LIST
}

fn parse_user(raw: &str) -> Result<UserId, ApiError> {
    raw.parse::<UserId>()
        .map_err(|e| ApiError::BadRequest(GateError::from(e).to_string()))
}

/// Grant premium for N days.
pub async fn grant(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(req): Json<GrantRequest>,
) -> Result<Json<AccountStatus>, ApiError> {
    let status = state.admin.grant(auth.admin_id, req.user_id, req.days)?;
    Ok(Json(status))
}

/// Revoke premium.
pub async fn revoke(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(req): Json<UserRequest>,
) -> Result<Json<AccountStatus>, ApiError> {
    let status = state.admin.revoke(auth.admin_id, req.user_id)?;
    Ok(Json(status))
}

/// Reset a user's daily counter.
pub async fn reset_counter(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(req): Json<ResetCounterRequest>,
) -> Result<Json<ResetCounterResponse>, ApiError> {
    let day = req
        .day
        .as_deref()
        .map(parse_day)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let existed = state.admin.reset_counter(auth.admin_id, req.user_id, day)?;

    Ok(Json(ResetCounterResponse {
        user_id: req.user_id,
        day,
        existed,
    }))
}

/// List users, premium first.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    Ok(Json(state.admin.list_users(auth.admin_id, query.limit)?))
}

/// Inspect everything stored about a user.
pub async fn inspect_user(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(user_id): Path<String>,
) -> Result<Json<UserReport>, ApiError> {
    let user_id = parse_user(&user_id)?;
    Ok(Json(state.admin.inspect(auth.admin_id, user_id)?))
}

/// Look up a payment by local or processor id.
pub async fn find_payment(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(id): Path<String>,
) -> Result<Json<Payment>, ApiError> {
    Ok(Json(state.admin.find_payment(auth.admin_id, &id)?))
}

/// Ask the processor about a payment, activating it if paid.
pub async fn check_payment(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(id): Path<String>,
) -> Result<Json<PollOutcome>, ApiError> {
    Ok(Json(state.admin.check_payment(auth.admin_id, &id).await?))
}

/// Complete a payment manually.
pub async fn complete_payment(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(id): Path<String>,
) -> Result<Json<PollOutcome>, ApiError> {
    Ok(Json(state.admin.complete_payment(auth.admin_id, &id).await?))
}

/// Service-wide counts.
pub async fn stats(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
) -> Result<Json<AdminStats>, ApiError> {
    Ok(Json(state.admin.stats(auth.admin_id)?))
}
