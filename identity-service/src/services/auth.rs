//! Authentication orchestration: registration, login with the two-factor
//! gate, token refresh, logout.
//!
//! Login/registration flow: credential check → 2FA gate (when enabled) →
//! session create → token issue → audit record. No session exists until the
//! gate has passed.

use std::sync::Arc;
use uuid::Uuid;

use crate::models::{AuditAction, AuditLog, SanitizedUser, User};
use crate::services::{
    AuditService, Database, EmailProvider, ServiceError, SessionService, TokenService,
    TwoFactorService,
};
use crate::utils::{hash_password, verify_password};

/// A completed authentication: the session and its bearer token.
pub struct AuthSuccess {
    pub user: SanitizedUser,
    pub token: String,
    pub session_id: Uuid,
    pub expires_in: i64,
    /// Set when a backup code was consumed to log in.
    pub backup_codes_remaining: Option<usize>,
}

/// Outcome of the credential check at login.
pub enum LoginOutcome {
    Success(AuthSuccess),
    /// Account has 2FA enabled; no session was created. The caller completes
    /// login through the verify-code or verify-backup-code endpoints.
    TwoFactorRequired { user_id: Uuid },
}

#[derive(Clone, Copy)]
pub enum TwoFactorMethod {
    Totp,
    BackupCode,
}

#[derive(Clone)]
pub struct AuthService {
    db: Database,
    sessions: SessionService,
    tokens: TokenService,
    two_factor: TwoFactorService,
    audit: AuditService,
    email: Arc<dyn EmailProvider>,
}

impl AuthService {
    pub fn new(
        db: Database,
        sessions: SessionService,
        tokens: TokenService,
        two_factor: TwoFactorService,
        audit: AuditService,
        email: Arc<dyn EmailProvider>,
    ) -> Self {
        Self {
            db,
            sessions,
            tokens,
            two_factor,
            audit,
            email,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn register(
        &self,
        email: String,
        username: Option<String>,
        mobile: Option<String>,
        password: &str,
        first_name: Option<String>,
        last_name: Option<String>,
        ip: Option<String>,
        user_agent: String,
    ) -> Result<AuthSuccess, ServiceError> {
        for credential in [Some(&email), username.as_ref(), mobile.as_ref()]
            .into_iter()
            .flatten()
        {
            if self.db.find_user_by_credential(credential).await?.is_some() {
                return Err(ServiceError::UserAlreadyExists);
            }
        }

        let password_hash = hash_password(password).map_err(ServiceError::Internal)?;
        let user = User::new(email, username, mobile, password_hash, first_name, last_name);
        self.db.insert_user(&user).await?;

        tracing::info!(user_id = %user.id, "User registered");

        self.audit.record_async(AuditLog::new(
            Some(user.id),
            AuditAction::UserRegistered,
            "user",
            Some(user.id.to_string()),
            None,
            Some(serde_json::json!({ "email": user.email, "role": user.role })),
            ip.clone(),
        ));

        self.open_session(&user, AuditAction::UserLogin, ip, user_agent, None)
            .await
    }

    /// Verify credentials. For a 2FA-enabled account this stops at the gate;
    /// otherwise it opens the session and issues the token.
    pub async fn login(
        &self,
        credential: &str,
        password: &str,
        ip: Option<String>,
        user_agent: String,
    ) -> Result<LoginOutcome, ServiceError> {
        let user = self
            .db
            .find_user_by_credential(credential)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash).map_err(ServiceError::Internal)? {
            return Err(ServiceError::InvalidCredentials);
        }

        if !user.is_active {
            return Err(ServiceError::InactiveAccount);
        }

        if self.two_factor.is_enabled(user.id).await? {
            return Ok(LoginOutcome::TwoFactorRequired { user_id: user.id });
        }

        let success = self
            .open_session(&user, AuditAction::UserLogin, ip, user_agent, None)
            .await?;
        self.notify_login(&user);
        Ok(LoginOutcome::Success(success))
    }

    /// Complete a 2FA-gated login with a TOTP code or a backup code.
    pub async fn complete_two_factor_login(
        &self,
        user_id: Uuid,
        code: &str,
        method: TwoFactorMethod,
        ip: Option<String>,
        user_agent: String,
    ) -> Result<AuthSuccess, ServiceError> {
        let (action, remaining) = match method {
            TwoFactorMethod::Totp => {
                self.two_factor.verify_code(user_id, code).await?;
                (AuditAction::UserLoginTwoFactor, None)
            }
            TwoFactorMethod::BackupCode => {
                let remaining = self.two_factor.verify_backup_code(user_id, code).await?;
                (AuditAction::UserLoginBackupCode, Some(remaining))
            }
        };

        let user = self
            .db
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        if !user.is_active {
            return Err(ServiceError::InactiveAccount);
        }

        let success = self
            .open_session(&user, action, ip, user_agent, remaining)
            .await?;
        self.notify_login(&user);
        Ok(success)
    }

    /// Re-issue a token with a fresh role snapshot. The session reference is
    /// carried over unchanged; the middleware has already validated it.
    pub async fn refresh(
        &self,
        user_id: Uuid,
        session_id: Option<Uuid>,
    ) -> Result<(String, SanitizedUser, i64), ServiceError> {
        let user = self
            .db
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        if !user.is_active {
            return Err(ServiceError::InactiveAccount);
        }

        let token = self
            .tokens
            .issue(user.id, &user.email, &user.role, session_id)?;

        Ok((token, user.sanitized(), self.tokens.expiry_seconds()))
    }

    pub async fn logout(
        &self,
        user_id: Uuid,
        session_id: Option<Uuid>,
        ip: Option<String>,
    ) -> Result<(), ServiceError> {
        if let Some(session_id) = session_id {
            self.sessions.terminate(session_id).await?;
        }

        self.audit.record_async(AuditLog::new(
            Some(user_id),
            AuditAction::UserLogout,
            "user",
            Some(user_id.to_string()),
            None,
            None,
            ip,
        ));

        tracing::info!(user_id = %user_id, "User logged out");
        Ok(())
    }

    pub async fn logout_all(
        &self,
        user_id: Uuid,
        ip: Option<String>,
    ) -> Result<u64, ServiceError> {
        let count = self.sessions.terminate_all(user_id).await?;

        self.audit.record_async(AuditLog::new(
            Some(user_id),
            AuditAction::UserLogoutAll,
            "user",
            Some(user_id.to_string()),
            None,
            Some(serde_json::json!({ "sessions_terminated": count })),
            ip,
        ));

        Ok(count)
    }

    async fn open_session(
        &self,
        user: &User,
        action: AuditAction,
        ip: Option<String>,
        user_agent: String,
        backup_codes_remaining: Option<usize>,
    ) -> Result<AuthSuccess, ServiceError> {
        let session = self
            .sessions
            .create(user.id, ip.clone().unwrap_or_default(), user_agent)
            .await?;

        let token = self
            .tokens
            .issue(user.id, &user.email, &user.role, Some(session.id))?;

        self.audit.record_async(AuditLog::new(
            Some(user.id),
            action,
            "user",
            Some(user.id.to_string()),
            None,
            None,
            ip,
        ));

        Ok(AuthSuccess {
            user: user.sanitized(),
            token,
            session_id: session.id,
            expires_in: self.tokens.expiry_seconds(),
            backup_codes_remaining,
        })
    }

    /// Login notification is fire-and-forget; failures only reach the logs.
    fn notify_login(&self, user: &User) {
        let email = self.email.clone();
        let to_email = user.email.clone();
        tokio::spawn(async move {
            if let Err(e) = email.send_login_notification(&to_email).await {
                tracing::warn!(error = %e, "Login notification email failed");
            }
        });
    }
}
