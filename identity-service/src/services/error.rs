use service_core::error::AppError;
use thiserror::Error;

/// Error taxonomy for the authorization/session core.
///
/// Callers see only the minimal message from the `AppError` mapping; reset
/// token reasons are the one family surfaced verbatim (the token itself, not
/// the account, is the secret).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    // Authentication
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("User account is inactive")]
    InactiveAccount,

    // Session lifecycle
    #[error("Session not found")]
    SessionNotFound,
    #[error("Session expired")]
    SessionExpired,
    #[error("Session terminated")]
    SessionTerminated,

    // Bearer token verification
    #[error("Malformed token")]
    TokenMalformed,
    #[error("Token expired")]
    TokenExpired,
    #[error("Token signature invalid")]
    TokenSignatureInvalid,

    // Authorization
    #[error("Permission denied")]
    Forbidden,

    // Two-factor
    #[error("Two-factor authentication is not configured")]
    TwoFactorNotConfigured,
    #[error("Invalid verification code")]
    InvalidTwoFactorCode,
    #[error("Invalid backup code")]
    InvalidBackupCode,

    // Password reset
    #[error("Invalid reset token")]
    ResetTokenInvalid,
    #[error("Reset token has expired")]
    ResetTokenExpired,
    #[error("Reset token has already been used")]
    ResetTokenAlreadyUsed,

    // Audit
    #[error("Audit write failed: {0}")]
    AuditWriteFailed(String),

    #[error("User not found")]
    UserNotFound,
    #[error("User already exists")]
    UserAlreadyExists,
    #[error("Email error: {0}")]
    Email(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::InactiveAccount => {
                AppError::Forbidden(anyhow::anyhow!("User account is inactive"))
            }
            ServiceError::SessionNotFound => AppError::SessionError {
                message: "Session not found. Please log in again.".to_string(),
                code: "SESSION_NOT_FOUND",
            },
            ServiceError::SessionExpired => AppError::SessionError {
                message: "Session expired".to_string(),
                code: "SESSION_TIMEOUT",
            },
            ServiceError::SessionTerminated => AppError::SessionError {
                message: "Session terminated. Please log in again.".to_string(),
                code: "SESSION_TERMINATED",
            },
            ServiceError::TokenMalformed
            | ServiceError::TokenExpired
            | ServiceError::TokenSignatureInvalid => {
                AppError::AuthError(anyhow::anyhow!("Invalid or expired token"))
            }
            ServiceError::Forbidden => AppError::Forbidden(anyhow::anyhow!("Permission denied")),
            ServiceError::TwoFactorNotConfigured => {
                AppError::BadRequest(anyhow::anyhow!("Two-factor authentication is not configured"))
            }
            ServiceError::InvalidTwoFactorCode => {
                AppError::AuthError(anyhow::anyhow!("Invalid verification code"))
            }
            ServiceError::InvalidBackupCode => {
                AppError::AuthError(anyhow::anyhow!("Invalid backup code"))
            }
            ServiceError::ResetTokenInvalid => {
                AppError::BadRequest(anyhow::anyhow!("Invalid reset token"))
            }
            ServiceError::ResetTokenExpired => {
                AppError::BadRequest(anyhow::anyhow!("Reset token has expired"))
            }
            ServiceError::ResetTokenAlreadyUsed => {
                AppError::BadRequest(anyhow::anyhow!("Reset token has already been used"))
            }
            ServiceError::AuditWriteFailed(e) => {
                AppError::InternalError(anyhow::anyhow!("Audit write failed: {}", e))
            }
            ServiceError::UserNotFound => AppError::NotFound(anyhow::anyhow!("User not found")),
            ServiceError::UserAlreadyExists => {
                AppError::Conflict(anyhow::anyhow!("User already exists"))
            }
            ServiceError::Email(e) => AppError::EmailError(e),
        }
    }
}
