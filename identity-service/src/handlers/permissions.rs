//! Permission query and grant management handlers.
//!
//! Queries answer from the injected snapshot (no storage round-trip); grant
//! mutations write the dynamic rows and refresh the snapshot.

use axum::{
    extract::{ConnectInfo, Json, Query, State},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use utoipa::ToSchema;
use validator::Validate;

use crate::handlers::{client_ip, require_permission, MessageResponse};
use crate::middleware::CurrentUser;
use crate::models::{AuditAction, AuditLog, PermissionGrant};
use crate::AppState;
use service_core::error::AppError;

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub resource: String,
    pub action: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckResponse {
    pub allowed: bool,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MyPermissionsResponse {
    pub role: String,
    pub permissions: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AccessibleResponse {
    pub role: String,
    pub resources: Vec<String>,
    pub actions: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AllPermissionsResponse {
    pub roles: Vec<String>,
    pub permissions: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GrantRequest {
    #[validate(length(min = 1))]
    pub role: String,
    #[validate(length(min = 1))]
    pub resource: String,
    #[validate(length(min = 1))]
    pub action: String,
}

impl From<GrantRequest> for PermissionGrant {
    fn from(req: GrantRequest) -> Self {
        PermissionGrant {
            role: req.role,
            resource: req.resource,
            action: req.action,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Can the caller's role perform (resource, action)?
///
/// GET /permissions/check?resource=..&action=..
pub async fn check(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Query(query): Query<CheckQuery>,
) -> Result<Json<CheckResponse>, AppError> {
    let allowed = state
        .permissions
        .check(&claims.role, &query.resource, &query.action);

    Ok(Json(CheckResponse {
        allowed,
        message: if allowed {
            "Permission granted".to_string()
        } else {
            "Permission denied".to_string()
        },
    }))
}

/// The caller's effective permission map (defaults ∪ dynamic grants).
///
/// GET /permissions/me
pub async fn my_permissions(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<MyPermissionsResponse>, AppError> {
    let permissions = state.permissions.current().role_permissions(&claims.role);

    Ok(Json(MyPermissionsResponse {
        role: claims.role,
        permissions,
    }))
}

/// Resources on which the caller has at least one action.
///
/// GET /permissions/accessible
pub async fn accessible(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<AccessibleResponse>, AppError> {
    let snapshot = state.permissions.current();

    Ok(Json(AccessibleResponse {
        resources: snapshot.accessible_resources(&claims.role),
        actions: snapshot.role_permissions(&claims.role),
        role: claims.role,
    }))
}

/// Effective permissions for every known role.
///
/// GET /permissions/all
pub async fn all_permissions(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<AllPermissionsResponse>, AppError> {
    require_permission(&state, &claims.role, "permissions", "read")?;

    let snapshot = state.permissions.current();
    let roles = snapshot.all_roles();
    let permissions = roles
        .iter()
        .map(|role| (role.clone(), snapshot.role_permissions(role)))
        .collect();

    Ok(Json(AllPermissionsResponse { roles, permissions }))
}

/// The dynamic grant rows currently in storage.
///
/// GET /permissions
pub async fn list(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<Vec<PermissionGrant>>, AppError> {
    require_permission(&state, &claims.role, "permissions", "read")?;

    let grants = state.permissions.list_grants().await.map_err(AppError::from)?;
    Ok(Json(grants))
}

/// Add a dynamic grant. The snapshot is refreshed before the response, so a
/// follow-up check already sees the union.
///
/// POST /permissions
pub async fn add(
    State(state): State<AppState>,
    headers: HeaderMap,
    conn: Option<ConnectInfo<SocketAddr>>,
    CurrentUser(claims): CurrentUser,
    Json(req): Json<GrantRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    req.validate()?;
    require_permission(&state, &claims.role, "settings", "manage_roles")?;

    let grant = PermissionGrant::from(req);
    state.permissions.add_grant(&grant).await.map_err(AppError::from)?;

    state.audit.record_async(AuditLog::new(
        Some(claims.sub),
        AuditAction::PermissionAdded,
        "permission",
        Some(format!("{}:{}:{}", grant.role, grant.resource, grant.action)),
        None,
        Some(serde_json::to_value(&grant).unwrap_or_default()),
        client_ip(&headers, conn.as_ref()),
    ));

    Ok((StatusCode::CREATED, Json(MessageResponse::ok("Permission added"))))
}

/// Remove a dynamic grant. Compiled defaults are not removable.
///
/// DELETE /permissions
pub async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    conn: Option<ConnectInfo<SocketAddr>>,
    CurrentUser(claims): CurrentUser,
    Json(req): Json<GrantRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    req.validate()?;
    require_permission(&state, &claims.role, "settings", "manage_roles")?;

    let grant = PermissionGrant::from(req);
    let deleted = state
        .permissions
        .remove_grant(&grant)
        .await
        .map_err(AppError::from)?;

    state.audit.record_async(AuditLog::new(
        Some(claims.sub),
        AuditAction::PermissionRemoved,
        "permission",
        Some(format!("{}:{}:{}", grant.role, grant.resource, grant.action)),
        Some(serde_json::to_value(&grant).unwrap_or_default()),
        None,
        client_ip(&headers, conn.as_ref()),
    ));

    Ok(Json(MessageResponse::ok(format!(
        "Permission removed ({} row(s))",
        deleted
    ))))
}
