//! Password reset token model - single-use, time-boxed.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Reset tokens are valid for one hour from issuance.
pub const RESET_TOKEN_TTL_HOURS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetTokenStatus {
    Consumable,
    Expired,
    AlreadyUsed,
}

/// Password reset token entity. `used_at` is set exactly once, by the
/// guarded consume UPDATE.
#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PasswordResetToken {
    pub fn new(user_id: Uuid, token: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            token,
            expires_at: now + Duration::hours(RESET_TOKEN_TTL_HOURS),
            used_at: None,
            created_at: now,
        }
    }

    /// A token is consumable iff never used and not past expiry. Used wins
    /// over expired when both hold, matching the consume diagnostics.
    pub fn status(&self, now: DateTime<Utc>) -> ResetTokenStatus {
        if self.used_at.is_some() {
            return ResetTokenStatus::AlreadyUsed;
        }
        if now > self.expires_at {
            return ResetTokenStatus::Expired;
        }
        ResetTokenStatus::Consumable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_consumable() {
        let t = PasswordResetToken::new(Uuid::new_v4(), "ab12".to_string());
        assert_eq!(t.status(Utc::now()), ResetTokenStatus::Consumable);
    }

    #[test]
    fn past_expiry_is_expired_even_if_unused() {
        let mut t = PasswordResetToken::new(Uuid::new_v4(), "ab12".to_string());
        t.expires_at = Utc::now() - Duration::minutes(1);
        assert_eq!(t.status(Utc::now()), ResetTokenStatus::Expired);
    }

    #[test]
    fn used_token_reports_already_used() {
        let mut t = PasswordResetToken::new(Uuid::new_v4(), "ab12".to_string());
        t.used_at = Some(Utc::now());
        assert_eq!(t.status(Utc::now()), ResetTokenStatus::AlreadyUsed);

        // Used takes precedence over expired.
        t.expires_at = Utc::now() - Duration::minutes(1);
        assert_eq!(t.status(Utc::now()), ResetTokenStatus::AlreadyUsed);
    }
}
