//! Session management handlers: list, active, terminate, terminate-all.
//!
//! Cross-user access (the `user_id` override) requires the account
//! administration grant (`users`/`manage_status`); without it the override is
//! ignored and the caller operates on their own sessions.

use axum::{
    extract::{ConnectInfo, Json, Path, Query, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::handlers::{client_ip, require_permission, MessageResponse};
use crate::middleware::CurrentUser;
use crate::models::{AuditAction, AuditLog, Session};
use crate::services::ServiceError;
use crate::AppState;
use service_core::error::AppError;

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct TerminateAllRequest {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionEntry {
    pub id: Uuid,
    pub ip_address: String,
    pub device: String,
    pub login_time: chrono::DateTime<chrono::Utc>,
    pub last_activity: chrono::DateTime<chrono::Utc>,
    pub is_active: bool,
}

impl From<Session> for SessionEntry {
    fn from(s: Session) -> Self {
        Self {
            id: s.id,
            ip_address: s.ip_address,
            device: parse_user_agent(&s.user_agent),
            login_time: s.created_at,
            last_activity: s.last_activity,
            is_active: s.is_active,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionListResponse {
    pub total: usize,
    pub active: usize,
    pub sessions: Vec<SessionEntry>,
}

// ============================================================================
// Handlers
// ============================================================================

/// All sessions (active and historical) of the target user.
///
/// GET /sessions
pub async fn list(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Query(query): Query<SessionQuery>,
) -> Result<Json<SessionListResponse>, AppError> {
    require_permission(&state, &claims.role, "sessions", "read")?;

    let target = target_user(&state, &claims.role, claims.sub, query.user_id);
    let sessions = state.sessions.list(target).await.map_err(AppError::from)?;
    let active = sessions.iter().filter(|s| s.is_active).count();

    Ok(Json(SessionListResponse {
        total: sessions.len(),
        active,
        sessions: sessions.into_iter().map(SessionEntry::from).collect(),
    }))
}

/// Only the live sessions of the target user.
///
/// GET /sessions/active
pub async fn active(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Query(query): Query<SessionQuery>,
) -> Result<Json<SessionListResponse>, AppError> {
    require_permission(&state, &claims.role, "sessions", "read")?;

    let target = target_user(&state, &claims.role, claims.sub, query.user_id);
    let sessions = state
        .sessions
        .list_active(target)
        .await
        .map_err(AppError::from)?;
    let total = sessions.len();

    Ok(Json(SessionListResponse {
        total,
        active: total,
        sessions: sessions.into_iter().map(SessionEntry::from).collect(),
    }))
}

/// Terminate one session. Sibling sessions of the same user stay live.
///
/// DELETE /sessions/:id
pub async fn terminate(
    State(state): State<AppState>,
    headers: HeaderMap,
    conn: Option<ConnectInfo<SocketAddr>>,
    CurrentUser(claims): CurrentUser,
    Path(session_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    require_permission(&state, &claims.role, "sessions", "terminate")?;

    let session = state
        .sessions
        .get(session_id)
        .await
        .map_err(AppError::from)?;

    // Not the caller's session: needs the administration grant. 404 either
    // way, so session ids of other users cannot be probed.
    if session.user_id != claims.sub
        && !state
            .permissions
            .check(&claims.role, "users", "manage_status")
    {
        return Err(ServiceError::SessionNotFound.into());
    }

    state
        .sessions
        .terminate(session_id)
        .await
        .map_err(AppError::from)?;

    state.audit.record_async(AuditLog::new(
        Some(claims.sub),
        AuditAction::SessionTerminated,
        "session",
        Some(session_id.to_string()),
        None,
        None,
        client_ip(&headers, conn.as_ref()),
    ));

    Ok(Json(MessageResponse::ok("Session terminated successfully")))
}

/// Terminate every session of the target user.
///
/// POST /sessions/terminate-all
pub async fn terminate_all(
    State(state): State<AppState>,
    headers: HeaderMap,
    conn: Option<ConnectInfo<SocketAddr>>,
    CurrentUser(claims): CurrentUser,
    Json(req): Json<TerminateAllRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    require_permission(&state, &claims.role, "sessions", "terminate")?;

    let target = target_user(&state, &claims.role, claims.sub, req.user_id);
    let count = state
        .sessions
        .terminate_all(target)
        .await
        .map_err(AppError::from)?;

    state.audit.record_async(AuditLog::new(
        Some(claims.sub),
        AuditAction::SessionsTerminatedAll,
        "user",
        Some(target.to_string()),
        None,
        Some(serde_json::json!({ "sessions_terminated": count })),
        client_ip(&headers, conn.as_ref()),
    ));

    Ok(Json(MessageResponse::ok(
        "All sessions terminated successfully",
    )))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolve the target user: the override applies only with the account
/// administration grant, otherwise the caller operates on themselves.
fn target_user(state: &AppState, role: &str, self_id: Uuid, requested: Option<Uuid>) -> Uuid {
    match requested {
        Some(user_id)
            if user_id != self_id && state.permissions.check(role, "users", "manage_status") =>
        {
            user_id
        }
        _ => self_id,
    }
}

/// Coarse device label from the user agent, for the session list UI.
fn parse_user_agent(user_agent: &str) -> String {
    let device = if user_agent.contains("Windows") {
        "Windows Desktop"
    } else if user_agent.contains("Macintosh") {
        "Mac Desktop"
    } else if user_agent.contains("Linux") && !user_agent.contains("Android") {
        "Linux Desktop"
    } else if user_agent.contains("iPhone") {
        "iPhone"
    } else if user_agent.contains("iPad") {
        "iPad"
    } else if user_agent.contains("Android") {
        "Android Device"
    } else if user_agent.contains("Mobile") {
        "Mobile Device"
    } else {
        "Unknown Device"
    };
    device.to_string()
}

#[cfg(test)]
mod tests {
    use super::parse_user_agent;

    #[test]
    fn device_labels() {
        assert_eq!(
            parse_user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64)"),
            "Windows Desktop"
        );
        assert_eq!(
            parse_user_agent("Mozilla/5.0 (Linux; Android 14; Pixel 8)"),
            "Android Device"
        );
        assert_eq!(
            parse_user_agent("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)"),
            "iPhone"
        );
        assert_eq!(parse_user_agent(""), "Unknown Device");
    }
}
