pub mod auth;
pub mod password_reset;
pub mod permissions;
pub mod session;
pub mod two_factor;

use axum::extract::ConnectInfo;
use axum::http::HeaderMap;
use serde::Serialize;
use service_core::error::AppError;
use std::net::SocketAddr;
use utoipa::ToSchema;

use crate::services::ServiceError;
use crate::AppState;

/// Generic success envelope used by mutation endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Best-effort client IP: gateway-forwarded header first, socket peer second.
pub(crate) fn client_ip(
    headers: &HeaderMap,
    conn: Option<&ConnectInfo<SocketAddr>>,
) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .or_else(|| conn.map(|ConnectInfo(addr)| addr.ip().to_string()))
}

pub(crate) fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Every resource handler consults the permission resolver before acting.
pub(crate) fn require_permission(
    state: &AppState,
    role: &str,
    resource: &str,
    action: &str,
) -> Result<(), AppError> {
    if state.permissions.check(role, resource, action) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden.into())
    }
}
