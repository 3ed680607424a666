//! Two-factor authentication handlers.
//!
//! Setup/enable/status/disable run behind the auth middleware; the two
//! verify endpoints are public because they complete a login that stopped at
//! the 2FA gate (the caller has no token yet).

use axum::{
    extract::{ConnectInfo, Json, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::handlers::auth::AuthResponse;
use crate::handlers::{client_ip, user_agent, MessageResponse};
use crate::middleware::CurrentUser;
use crate::models::{AuditAction, AuditLog};
use crate::services::{ServiceError, TwoFactorMethod};
use crate::AppState;
use service_core::error::AppError;

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct SetupResponse {
    /// Base32 shared secret; shown exactly once.
    pub secret: String,
    /// otpauth:// provisioning URI for authenticator apps.
    pub otpauth_url: String,
    /// Single-use backup codes; shown exactly once.
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EnableRequest {
    #[validate(length(min = 16))]
    pub secret: String,
    #[validate(length(min = 1))]
    pub backup_codes: Vec<String>,
    #[validate(length(min = 6, max = 6))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyCodeRequest {
    pub user_id: Uuid,
    #[validate(length(min = 6, max = 6))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyBackupCodeRequest {
    pub user_id: Uuid,
    #[validate(length(min = 8, max = 8))]
    pub backup_code: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DisableRequest {
    /// Current password; disabling 2FA re-authenticates the user.
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub enabled: bool,
    pub backup_codes_remaining: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// Generate a pending secret, provisioning URI, and backup codes. Nothing is
/// enabled until the first code verifies through /auth/2fa/enable.
///
/// POST /auth/2fa/setup
pub async fn setup(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<SetupResponse>, AppError> {
    let setup = state
        .two_factor
        .setup(&claims.email)
        .map_err(AppError::from)?;

    Ok(Json(SetupResponse {
        secret: setup.secret,
        otpauth_url: setup.otpauth_url,
        backup_codes: setup.backup_codes,
    }))
}

/// Verify the first code against the pending secret and enable 2FA.
///
/// POST /auth/2fa/enable
pub async fn enable(
    State(state): State<AppState>,
    headers: HeaderMap,
    conn: Option<ConnectInfo<SocketAddr>>,
    CurrentUser(claims): CurrentUser,
    Json(req): Json<EnableRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    req.validate()?;

    state
        .two_factor
        .enable(claims.sub, &req.secret, &req.backup_codes, &req.code)
        .await
        .map_err(AppError::from)?;

    state.audit.record_async(AuditLog::new(
        Some(claims.sub),
        AuditAction::TwoFactorEnabled,
        "user_2fa",
        Some(claims.sub.to_string()),
        None,
        None,
        client_ip(&headers, conn.as_ref()),
    ));

    Ok(Json(MessageResponse::ok(
        "Two-factor authentication enabled",
    )))
}

/// Complete a 2FA-gated login with a TOTP code.
///
/// POST /auth/2fa/verify-code
pub async fn verify_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    conn: Option<ConnectInfo<SocketAddr>>,
    Json(req): Json<VerifyCodeRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    req.validate()?;

    let ip = client_ip(&headers, conn.as_ref());
    let agent = user_agent(&headers);

    let success = state
        .auth
        .complete_two_factor_login(req.user_id, &req.code, TwoFactorMethod::Totp, ip, agent)
        .await
        .map_err(AppError::from)?;

    let permissions = state.permissions.current().role_permissions(&success.user.role);
    Ok(Json(AuthResponse::from_success(success, Some(permissions))))
}

/// Complete a 2FA-gated login by consuming a backup code. Each code works at
/// most once; the response carries the remaining count.
///
/// POST /auth/2fa/verify-backup-code
pub async fn verify_backup_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    conn: Option<ConnectInfo<SocketAddr>>,
    Json(req): Json<VerifyBackupCodeRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    req.validate()?;

    let ip = client_ip(&headers, conn.as_ref());
    let agent = user_agent(&headers);

    let success = state
        .auth
        .complete_two_factor_login(
            req.user_id,
            &req.backup_code,
            TwoFactorMethod::BackupCode,
            ip,
            agent,
        )
        .await
        .map_err(AppError::from)?;

    let permissions = state.permissions.current().role_permissions(&success.user.role);
    Ok(Json(AuthResponse::from_success(success, Some(permissions))))
}

/// GET /auth/2fa/status
pub async fn status(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<StatusResponse>, AppError> {
    let status = state
        .two_factor
        .status(claims.sub)
        .await
        .map_err(AppError::from)?;

    Ok(Json(StatusResponse {
        enabled: status.enabled,
        backup_codes_remaining: status.backup_codes_remaining,
    }))
}

/// Disable 2FA after re-verifying the caller's password.
///
/// POST /auth/2fa/disable
pub async fn disable(
    State(state): State<AppState>,
    headers: HeaderMap,
    conn: Option<ConnectInfo<SocketAddr>>,
    CurrentUser(claims): CurrentUser,
    Json(req): Json<DisableRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    req.validate()?;

    let user = state
        .db
        .find_user_by_id(claims.sub)
        .await
        .map_err(|e| AppError::from(ServiceError::Database(e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    state
        .two_factor
        .disable(user.id, &user.password_hash, &req.password)
        .await
        .map_err(AppError::from)?;

    state.audit.record_async(AuditLog::new(
        Some(claims.sub),
        AuditAction::TwoFactorDisabled,
        "user_2fa",
        Some(claims.sub.to_string()),
        None,
        None,
        client_ip(&headers, conn.as_ref()),
    ));

    Ok(Json(MessageResponse::ok(
        "Two-factor authentication disabled",
    )))
}
