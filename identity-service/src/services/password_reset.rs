//! Single-use, time-boxed password reset tokens.
//!
//! The request path never reveals whether an email is registered. The
//! consume path rides on one conditional UPDATE so that N concurrent
//! submissions of the same token produce exactly one success.

use rand::RngCore;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    AuditAction, AuditLog, PasswordResetToken, ResetTokenStatus,
};
use crate::services::{AuditService, Database, EmailProvider, ServiceError, SessionService};
use crate::utils::hash_password;

/// 32 random bytes, hex-encoded: 256 bits of entropy per token.
const RESET_TOKEN_BYTES: usize = 32;

pub struct ResetVerification {
    pub user_id: Uuid,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone)]
pub struct PasswordResetService {
    db: Database,
    sessions: SessionService,
    audit: AuditService,
    email: Arc<dyn EmailProvider>,
    base_url: String,
}

impl PasswordResetService {
    pub fn new(
        db: Database,
        sessions: SessionService,
        audit: AuditService,
        email: Arc<dyn EmailProvider>,
        base_url: String,
    ) -> Self {
        Self {
            db,
            sessions,
            audit,
            email,
            base_url,
        }
    }

    /// Start a reset. Succeeds identically whether or not the email matches
    /// a user (anti-enumeration); the caller gets the same generic response
    /// either way. Email delivery is handed off and cannot fail the request.
    pub async fn request(&self, email: &str, ip: Option<String>) -> Result<(), ServiceError> {
        let Some(user) = self.db.find_user_by_email(email).await? else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let token = PasswordResetToken::new(user.id, generate_reset_token());
        self.db.insert_reset_token(&token).await?;

        let email_provider = self.email.clone();
        let to_email = user.email.clone();
        let token_value = token.token.clone();
        let base_url = self.base_url.clone();
        tokio::spawn(async move {
            if let Err(e) = email_provider
                .send_password_reset_email(&to_email, &token_value, &base_url)
                .await
            {
                tracing::error!(error = %e, "Password reset email delivery failed");
            }
        });

        self.audit.record_async(AuditLog::new(
            Some(user.id),
            AuditAction::PasswordResetRequested,
            "user",
            Some(user.id.to_string()),
            None,
            None,
            ip,
        ));

        tracing::info!(user_id = %user.id, "Password reset requested");
        Ok(())
    }

    /// Check a token without consuming it. The three failure reasons are
    /// distinct and surfaced to the caller; the token itself is the secret.
    pub async fn verify(&self, token: &str) -> Result<ResetVerification, ServiceError> {
        let row = self
            .db
            .find_reset_token(token)
            .await?
            .ok_or(ServiceError::ResetTokenInvalid)?;

        match row.status(chrono::Utc::now()) {
            ResetTokenStatus::Consumable => Ok(ResetVerification {
                user_id: row.user_id,
                expires_at: row.expires_at,
            }),
            ResetTokenStatus::Expired => Err(ServiceError::ResetTokenExpired),
            ResetTokenStatus::AlreadyUsed => Err(ServiceError::ResetTokenAlreadyUsed),
        }
    }

    /// Consume a token and set the new password.
    ///
    /// verify-and-mark-used is one guarded UPDATE in storage, not a
    /// check-then-act sequence; losers of the race get the precise reason
    /// from a follow-up read. All of the user's sessions are terminated after
    /// a successful reset.
    pub async fn consume(
        &self,
        token: &str,
        new_password: &str,
        ip: Option<String>,
    ) -> Result<(), ServiceError> {
        let Some(user_id) = self.db.consume_reset_token(token).await? else {
            return Err(self.diagnose_failed_consume(token).await?);
        };

        let password_hash = hash_password(new_password).map_err(ServiceError::Internal)?;
        self.db.update_password_hash(user_id, &password_hash).await?;

        let terminated = self.sessions.terminate_all(user_id).await?;

        self.audit.record_async(AuditLog::new(
            Some(user_id),
            AuditAction::PasswordResetCompleted,
            "user",
            Some(user_id.to_string()),
            None,
            Some(serde_json::json!({
                "method": "reset_token",
                "sessions_terminated": terminated,
            })),
            ip,
        ));

        tracing::info!(user_id = %user_id, "Password reset completed");
        Ok(())
    }

    /// The guarded UPDATE matched nothing; find out why for the caller.
    async fn diagnose_failed_consume(&self, token: &str) -> Result<ServiceError, ServiceError> {
        let Some(row) = self.db.find_reset_token(token).await? else {
            return Ok(ServiceError::ResetTokenInvalid);
        };
        Ok(match row.status(chrono::Utc::now()) {
            ResetTokenStatus::AlreadyUsed => ServiceError::ResetTokenAlreadyUsed,
            ResetTokenStatus::Expired => ServiceError::ResetTokenExpired,
            // The row exists and looks consumable but the UPDATE missed it:
            // a concurrent winner committed between our two statements.
            ResetTokenStatus::Consumable => ServiceError::ResetTokenAlreadyUsed,
        })
    }
}

fn generate_reset_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_tokens_are_long_and_unique() {
        let first = generate_reset_token();
        let second = generate_reset_token();
        assert_eq!(first.len(), RESET_TOKEN_BYTES * 2);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }
}
