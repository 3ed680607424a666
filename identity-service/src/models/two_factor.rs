//! Two-factor credential model.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of a user's two-factor configuration.
///
/// `PendingVerification` is the window between `setup` (secret issued to the
/// client) and `enable` (first code verified); no row exists yet in that
/// state, same as `NotConfigured`, but the flows treat them differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoFactorState {
    NotConfigured,
    PendingVerification,
    Enabled,
    Disabled,
}

/// Per-user two-factor credential: TOTP shared secret plus single-use backup
/// codes. Consumed backup codes are removed from the array, not marked.
#[derive(Debug, Clone, FromRow)]
pub struct TwoFactorCredential {
    pub user_id: Uuid,
    pub secret: String,
    pub is_enabled: bool,
    pub backup_codes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TwoFactorCredential {
    pub fn state(row: Option<&TwoFactorCredential>) -> TwoFactorState {
        match row {
            None => TwoFactorState::NotConfigured,
            Some(cred) if cred.is_enabled => TwoFactorState::Enabled,
            Some(_) => TwoFactorState::Disabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_derivation() {
        assert_eq!(
            TwoFactorCredential::state(None),
            TwoFactorState::NotConfigured
        );

        let mut cred = TwoFactorCredential {
            user_id: Uuid::new_v4(),
            secret: "JBSWY3DPEHPK3PXP".to_string(),
            is_enabled: true,
            backup_codes: vec!["A1B2C3D4".to_string()],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(
            TwoFactorCredential::state(Some(&cred)),
            TwoFactorState::Enabled
        );

        cred.is_enabled = false;
        assert_eq!(
            TwoFactorCredential::state(Some(&cred)),
            TwoFactorState::Disabled
        );
    }
}
