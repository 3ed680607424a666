//! Password reset handlers.
//!
//! The request endpoint answers identically whether or not the email is
//! registered. Verify/confirm surface the exact token state (invalid,
//! expired, already used): the token, not the email, is the secret.

use axum::{
    extract::{ConnectInfo, Json, Query, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::handlers::{client_ip, MessageResponse};
use crate::utils::validation::validate_password_strength;
use crate::AppState;
use service_core::error::AppError;

/// The one response body /auth/password-reset/request ever produces.
const GENERIC_RESET_MESSAGE: &str =
    "If an account with that email exists, a password reset link has been sent.";

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyResponse {
    pub valid: bool,
    pub user_id: Uuid,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ConfirmRequest {
    #[validate(length(min = 1))]
    pub token: String,
    #[validate(custom(function = "validate_password_strength"))]
    pub new_password: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Start a password reset. Anti-enumeration: the response is identical for
/// known and unknown emails.
///
/// POST /auth/password-reset/request
#[utoipa::path(
    post,
    path = "/auth/password-reset/request",
    request_body = ResetRequest,
    responses(
        (status = 200, description = "Generic acknowledgement, independent of whether the email exists", body = MessageResponse),
    ),
    tag = "Authentication"
)]
pub async fn request_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    conn: Option<ConnectInfo<SocketAddr>>,
    Json(req): Json<ResetRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    req.validate()?;

    let ip = client_ip(&headers, conn.as_ref());
    state
        .password_reset
        .request(&req.email, ip)
        .await
        .map_err(AppError::from)?;

    Ok(Json(MessageResponse::ok(GENERIC_RESET_MESSAGE)))
}

/// Check a reset token without consuming it.
///
/// GET /auth/password-reset/verify?token=..
#[utoipa::path(
    get,
    path = "/auth/password-reset/verify",
    params(("token" = String, Query, description = "Reset token from the email link")),
    responses(
        (status = 200, description = "Token is consumable", body = VerifyResponse),
        (status = 400, description = "Invalid, expired, or already used"),
    ),
    tag = "Authentication"
)]
pub async fn verify_reset(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<VerifyResponse>, AppError> {
    let verification = state
        .password_reset
        .verify(&query.token)
        .await
        .map_err(AppError::from)?;

    Ok(Json(VerifyResponse {
        valid: true,
        user_id: verification.user_id,
        expires_at: verification.expires_at,
    }))
}

/// Consume a reset token and set the new password. Exactly one of N
/// concurrent submissions of the same token can succeed.
///
/// POST /auth/password-reset/confirm
#[utoipa::path(
    post,
    path = "/auth/password-reset/confirm",
    request_body = ConfirmRequest,
    responses(
        (status = 200, description = "Password updated; all sessions terminated", body = MessageResponse),
        (status = 400, description = "Invalid, expired, or already used token"),
        (status = 422, description = "Password too weak"),
    ),
    tag = "Authentication"
)]
pub async fn confirm_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    conn: Option<ConnectInfo<SocketAddr>>,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    req.validate()?;

    let ip = client_ip(&headers, conn.as_ref());
    state
        .password_reset
        .consume(&req.token, &req.new_password, ip)
        .await
        .map_err(AppError::from)?;

    Ok(Json(MessageResponse::ok("Password reset successfully")))
}
