//! Authentication handlers: register, login (with the 2FA gate), refresh,
//! logout, logout-all.

use axum::{
    extract::{ConnectInfo, Json, State},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::handlers::{client_ip, user_agent, MessageResponse};
use crate::middleware::CurrentUser;
use crate::models::SanitizedUser;
use crate::services::{AuthSuccess, LoginOutcome, ServiceError};
use crate::utils::validation::{validate_mobile, validate_password_strength};
use crate::AppState;
use service_core::error::AppError;

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 3, max = 30))]
    pub username: Option<String>,
    #[validate(custom(function = "validate_mobile"))]
    pub mobile: Option<String>,
    #[validate(custom(function = "validate_password_strength"))]
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    /// Email, username, or mobile.
    #[validate(length(min = 1))]
    pub credential: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Successful authentication: bearer token plus the identity snapshot.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub session_id: Uuid,
    pub user: SanitizedUser,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<BTreeMap<String, BTreeSet<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_backup_codes: Option<usize>,
}

impl AuthResponse {
    pub(crate) fn from_success(
        success: AuthSuccess,
        permissions: Option<BTreeMap<String, BTreeSet<String>>>,
    ) -> Self {
        Self {
            token: success.token,
            token_type: "Bearer".to_string(),
            expires_in: success.expires_in,
            session_id: success.session_id,
            user: success.user,
            permissions,
            remaining_backup_codes: success.backup_codes_remaining,
        }
    }
}

/// Login either completes or stops at the two-factor gate.
#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum LoginResponse {
    Tokens(Box<AuthResponse>),
    TwoFactorRequired {
        requires_two_factor: bool,
        user_id: Uuid,
    },
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: SanitizedUser,
}

// ============================================================================
// Handlers
// ============================================================================

/// Register a new account and open its first session.
///
/// POST /auth/register
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 409, description = "User already exists"),
        (status = 422, description = "Validation failed"),
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    conn: Option<ConnectInfo<SocketAddr>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    req.validate()?;

    let ip = client_ip(&headers, conn.as_ref());
    let agent = user_agent(&headers);

    let success = state
        .auth
        .register(
            req.email,
            req.username,
            req.mobile,
            &req.password,
            req.first_name,
            req.last_name,
            ip,
            agent,
        )
        .await
        .map_err(AppError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse::from_success(success, None)),
    ))
}

/// Log in with any registered credential.
///
/// POST /auth/login
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated, or two-factor verification required", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account inactive"),
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    conn: Option<ConnectInfo<SocketAddr>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    req.validate()?;

    let ip = client_ip(&headers, conn.as_ref());
    let agent = user_agent(&headers);

    match state
        .auth
        .login(&req.credential, &req.password, ip, agent)
        .await
        .map_err(AppError::from)?
    {
        LoginOutcome::Success(success) => {
            let permissions = state.permissions.current().role_permissions(&success.user.role);
            Ok(Json(LoginResponse::Tokens(Box::new(
                AuthResponse::from_success(success, Some(permissions)),
            ))))
        }
        LoginOutcome::TwoFactorRequired { user_id } => Ok(Json(LoginResponse::TwoFactorRequired {
            requires_two_factor: true,
            user_id,
        })),
    }
}

/// Re-issue the bearer token with a fresh role snapshot. The session
/// reference inside the token is carried over; the middleware has already
/// re-validated it against storage.
///
/// POST /auth/refresh
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token issued", body = RefreshResponse),
        (status = 401, description = "Unauthenticated or session no longer live"),
    ),
    security(("bearer_auth" = [])),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<RefreshResponse>, AppError> {
    let (token, user, expires_in) = state
        .auth
        .refresh(claims.sub, claims.session_id)
        .await
        .map_err(AppError::from)?;

    Ok(Json(RefreshResponse {
        token,
        token_type: "Bearer".to_string(),
        expires_in,
        user,
    }))
}

/// Terminate the current session.
///
/// POST /auth/logout
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Session terminated", body = MessageResponse),
        (status = 401, description = "Unauthenticated"),
    ),
    security(("bearer_auth" = [])),
    tag = "Authentication"
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    conn: Option<ConnectInfo<SocketAddr>>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<MessageResponse>, AppError> {
    let ip = client_ip(&headers, conn.as_ref());
    state
        .auth
        .logout(claims.sub, claims.session_id, ip)
        .await
        .map_err(AppError::from)?;

    Ok(Json(MessageResponse::ok("Logged out")))
}

/// Terminate every session of the current user (all devices).
///
/// POST /auth/logout-all
#[utoipa::path(
    post,
    path = "/auth/logout-all",
    responses(
        (status = 200, description = "All sessions terminated", body = MessageResponse),
        (status = 401, description = "Unauthenticated"),
    ),
    security(("bearer_auth" = [])),
    tag = "Authentication"
)]
pub async fn logout_all(
    State(state): State<AppState>,
    headers: HeaderMap,
    conn: Option<ConnectInfo<SocketAddr>>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<MessageResponse>, AppError> {
    let ip = client_ip(&headers, conn.as_ref());
    state
        .auth
        .logout_all(claims.sub, ip)
        .await
        .map_err(AppError::from)?;

    Ok(Json(MessageResponse::ok("Logged out from all devices")))
}

/// Current user's profile, as seen by the token + session checks.
///
/// GET /auth/me
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<SanitizedUser>, AppError> {
    let user = state
        .db
        .find_user_by_id(claims.sub)
        .await
        .map_err(|e| AppError::from(ServiceError::Database(e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    Ok(Json(user.sanitized()))
}
