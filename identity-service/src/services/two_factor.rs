//! Two-factor verification: TOTP codes and single-use backup codes.
//!
//! Codes are standard RFC 6238 TOTP (SHA-1, 6 digits, 30-second step) and are
//! accepted within ±2 steps to absorb clock drift. A code can validate more
//! than once inside its window; there is no per-code replay ledger (the
//! session minted by a verification is the revocable unit, and the code
//! endpoints sit behind the login rate limits).

use rand::Rng;
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use crate::models::{TwoFactorCredential, TwoFactorState};
use crate::services::{Database, ServiceError};
use crate::utils::verify_password;

const TOTP_DIGITS: usize = 6;
const TOTP_STEP_SECONDS: u64 = 30;
/// Accept codes within ±2 steps of now.
const TOTP_SKEW_STEPS: u8 = 2;
const BACKUP_CODE_COUNT: usize = 10;

const ISSUER: &str = "Business Analyst Assistant";

/// Material returned by `setup`; nothing is persisted until `enable`
/// verifies the first code (PendingVerification state lives client-side).
#[derive(Debug)]
pub struct TwoFactorSetup {
    pub secret: String,
    pub otpauth_url: String,
    pub backup_codes: Vec<String>,
}

#[derive(Debug)]
pub struct TwoFactorStatus {
    pub enabled: bool,
    pub backup_codes_remaining: usize,
}

#[derive(Clone)]
pub struct TwoFactorService {
    db: Database,
}

impl TwoFactorService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Generate a fresh secret, provisioning URI, and backup codes.
    pub fn setup(&self, account_email: &str) -> Result<TwoFactorSetup, ServiceError> {
        let secret = Secret::generate_secret();
        let secret_bytes = secret
            .to_bytes()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Secret generation: {:?}", e)))?;

        let totp = TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            1,
            TOTP_STEP_SECONDS,
            secret_bytes,
            Some(ISSUER.to_string()),
            account_email.to_string(),
        )
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("TOTP init: {}", e)))?;

        Ok(TwoFactorSetup {
            secret: totp.get_secret_base32(),
            otpauth_url: totp.get_url(),
            backup_codes: generate_backup_codes(),
        })
    }

    /// Enable 2FA: verify the first code against the pending secret, then
    /// persist secret + backup codes with the enabled flag set.
    pub async fn enable(
        &self,
        user_id: Uuid,
        secret: &str,
        backup_codes: &[String],
        code: &str,
    ) -> Result<(), ServiceError> {
        if !verify_totp(secret, code)? {
            return Err(ServiceError::InvalidTwoFactorCode);
        }

        let normalized: Vec<String> = backup_codes.iter().map(|c| c.to_uppercase()).collect();
        self.db.upsert_two_factor(user_id, secret, &normalized).await?;

        tracing::info!(user_id = %user_id, "Two-factor authentication enabled");
        Ok(())
    }

    /// Verify a TOTP code for a user with 2FA enabled (the login gate).
    pub async fn verify_code(&self, user_id: Uuid, code: &str) -> Result<(), ServiceError> {
        let cred = self.enabled_credential(user_id).await?;

        if verify_totp(&cred.secret, code)? {
            Ok(())
        } else {
            Err(ServiceError::InvalidTwoFactorCode)
        }
    }

    /// Consume a backup code. The guarded UPDATE in storage removes the code
    /// only if still present, so the same code can never succeed twice even
    /// under concurrent attempts. Returns the number of codes left.
    pub async fn verify_backup_code(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<usize, ServiceError> {
        let normalized = code.trim().to_uppercase();
        match self.db.consume_backup_code(user_id, &normalized).await? {
            Some(remaining) => {
                tracing::info!(user_id = %user_id, remaining, "Backup code consumed");
                Ok(remaining as usize)
            }
            None => {
                // Distinguish "no 2FA at all" from "wrong/used code".
                match TwoFactorCredential::state(self.db.find_two_factor(user_id).await?.as_ref())
                {
                    TwoFactorState::Enabled => Err(ServiceError::InvalidBackupCode),
                    _ => Err(ServiceError::TwoFactorNotConfigured),
                }
            }
        }
    }

    /// Disable 2FA. Requires re-authentication: the caller's current
    /// password is verified against the stored hash before anything flips.
    pub async fn disable(
        &self,
        user_id: Uuid,
        stored_password_hash: &str,
        password: &str,
    ) -> Result<(), ServiceError> {
        if !verify_password(password, stored_password_hash).map_err(ServiceError::Internal)? {
            return Err(ServiceError::InvalidCredentials);
        }

        let updated = self.db.disable_two_factor(user_id).await?;
        if updated == 0 {
            return Err(ServiceError::TwoFactorNotConfigured);
        }

        tracing::info!(user_id = %user_id, "Two-factor authentication disabled");
        Ok(())
    }

    pub async fn status(&self, user_id: Uuid) -> Result<TwoFactorStatus, ServiceError> {
        let row = self.db.find_two_factor(user_id).await?;
        Ok(match row {
            Some(cred) => TwoFactorStatus {
                enabled: cred.is_enabled,
                backup_codes_remaining: cred.backup_codes.len(),
            },
            None => TwoFactorStatus {
                enabled: false,
                backup_codes_remaining: 0,
            },
        })
    }

    /// Whether login must pass the 2FA gate for this user.
    pub async fn is_enabled(&self, user_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self
            .db
            .find_two_factor(user_id)
            .await?
            .map(|cred| cred.is_enabled)
            .unwrap_or(false))
    }

    async fn enabled_credential(&self, user_id: Uuid) -> Result<TwoFactorCredential, ServiceError> {
        let row = self.db.find_two_factor(user_id).await?;
        match TwoFactorCredential::state(row.as_ref()) {
            TwoFactorState::Enabled => Ok(row.expect("state Enabled implies a row")),
            _ => Err(ServiceError::TwoFactorNotConfigured),
        }
    }
}

/// Check a TOTP code against a base32 secret with the configured skew.
fn verify_totp(secret_base32: &str, code: &str) -> Result<bool, ServiceError> {
    let totp = totp_for_secret(secret_base32)?;
    Ok(totp.check_current(code).unwrap_or(false))
}

/// Build the TOTP instance for a stored secret. `new_unchecked` because
/// stored secrets may predate the 128-bit minimum `TOTP::new` enforces.
fn totp_for_secret(secret_base32: &str) -> Result<TOTP, ServiceError> {
    let secret_bytes = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Invalid stored secret: {:?}", e)))?;

    Ok(TOTP::new_unchecked(
        Algorithm::SHA1,
        TOTP_DIGITS,
        TOTP_SKEW_STEPS,
        TOTP_STEP_SECONDS,
        secret_bytes,
        Some(ISSUER.to_string()),
        String::new(),
    ))
}

/// Ten single-use codes, eight uppercase hex characters each.
fn generate_backup_codes() -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..BACKUP_CODE_COUNT)
        .map(|_| {
            let bytes: [u8; 4] = rng.gen();
            hex::encode_upper(bytes)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "JBSWY3DPEHPK3PXP";

    #[test]
    fn current_window_code_verifies() {
        let totp = totp_for_secret(TEST_SECRET).unwrap();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let code = totp.generate(now);
        assert!(totp.check(&code, now));
    }

    #[test]
    fn drift_within_two_steps_is_accepted() {
        let totp = totp_for_secret(TEST_SECRET).unwrap();
        let now = 1_700_000_000u64;

        // Codes from two steps before and after the current window still pass.
        let before = totp.generate(now - 2 * TOTP_STEP_SECONDS);
        let after = totp.generate(now + 2 * TOTP_STEP_SECONDS);
        assert!(totp.check(&before, now));
        assert!(totp.check(&after, now));
    }

    #[test]
    fn five_minute_old_code_fails() {
        let totp = totp_for_secret(TEST_SECRET).unwrap();
        let now = 1_700_000_000u64;

        let stale = totp.generate(now - 300);
        assert!(!totp.check(&stale, now));
    }

    #[test]
    fn wrong_code_fails() {
        let totp = totp_for_secret(TEST_SECRET).unwrap();
        assert!(!totp.check("000001", 1_700_000_000));
    }

    #[test]
    fn backup_codes_are_distinct_uppercase_hex() {
        let codes = generate_backup_codes();
        assert_eq!(codes.len(), BACKUP_CODE_COUNT);
        for code in &codes {
            assert_eq!(code.len(), 8);
            assert!(code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn setup_produces_provisioning_material() {
        // setup() needs no storage; construct the service-free path directly.
        let secret = Secret::generate_secret();
        let bytes = secret.to_bytes().unwrap();
        let totp = TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            1,
            TOTP_STEP_SECONDS,
            bytes,
            Some(ISSUER.to_string()),
            "user@example.com".to_string(),
        )
        .unwrap();

        assert!(!totp.get_secret_base32().is_empty());
        assert!(totp.get_url().starts_with("otpauth://totp/"));
    }
}
