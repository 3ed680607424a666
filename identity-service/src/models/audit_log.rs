//! Audit log model - append-only security event records.
//!
//! There is deliberately no update or delete path for these rows anywhere in
//! the crate.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Security-relevant actions recorded by the audit sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    UserRegistered,
    UserLogin,
    UserLoginTwoFactor,
    UserLoginBackupCode,
    UserLogout,
    UserLogoutAll,
    TokenRefreshed,
    SessionTerminated,
    SessionsTerminatedAll,
    TwoFactorEnabled,
    TwoFactorDisabled,
    PasswordResetRequested,
    PasswordResetCompleted,
    PermissionAdded,
    PermissionRemoved,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::UserRegistered => "USER_REGISTERED",
            AuditAction::UserLogin => "USER_LOGIN",
            AuditAction::UserLoginTwoFactor => "USER_LOGIN_2FA",
            AuditAction::UserLoginBackupCode => "USER_LOGIN_2FA_BACKUP",
            AuditAction::UserLogout => "USER_LOGOUT",
            AuditAction::UserLogoutAll => "USER_LOGOUT_ALL",
            AuditAction::TokenRefreshed => "TOKEN_REFRESHED",
            AuditAction::SessionTerminated => "SESSION_TERMINATED",
            AuditAction::SessionsTerminatedAll => "SESSIONS_TERMINATED_ALL",
            AuditAction::TwoFactorEnabled => "2FA_ENABLED",
            AuditAction::TwoFactorDisabled => "2FA_DISABLED",
            AuditAction::PasswordResetRequested => "PASSWORD_RESET_REQUESTED",
            AuditAction::PasswordResetCompleted => "PASSWORD_RESET",
            AuditAction::PermissionAdded => "PERMISSION_ADDED",
            AuditAction::PermissionRemoved => "PERMISSION_REMOVED",
        }
    }
}

/// Audit log entity: who did what to which entity, with before/after
/// snapshots and the caller's IP.
#[derive(Debug, Clone, FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    pub fn new(
        user_id: Option<Uuid>,
        action: AuditAction,
        entity_type: impl Into<String>,
        entity_id: Option<String>,
        old_values: Option<serde_json::Value>,
        new_values: Option<serde_json::Value>,
        ip_address: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            action: action.as_str().to_string(),
            entity_type: entity_type.into(),
            entity_id,
            old_values,
            new_values,
            ip_address,
            created_at: Utc::now(),
        }
    }
}
