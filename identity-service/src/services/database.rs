//! PostgreSQL storage layer.
//!
//! All SQL lives here; services above it only see typed operations. The two
//! guarded UPDATEs (`consume_reset_token`, `consume_backup_code`) are the
//! compare-and-set primitives the reset and backup-code flows rely on.

use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::{AuditLog, PasswordResetToken, PermissionGrant, Session, TwoFactorCredential, User};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ==================== Users ====================

    pub async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Find a user by login credential: email, username, or mobile.
    pub async fn find_user_by_credential(
        &self,
        credential: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE LOWER(email) = LOWER($1)
               OR LOWER(username) = LOWER($1)
               OR mobile = $1
            "#,
        )
        .bind(credential)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn insert_user(&self, user: &User) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO users
                (id, email, username, mobile, password_hash, first_name, last_name,
                 role, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.mobile)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.role)
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The only user column this core writes: the password hash, on reset.
    pub async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ==================== Sessions ====================

    pub async fn insert_session(&self, session: &Session) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO user_sessions
                (id, user_id, ip_address, user_agent, created_at, last_activity,
                 is_active, logout_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.created_at)
        .bind(session.last_activity)
        .bind(session.is_active)
        .bind(session.logout_time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_session_by_id(
        &self,
        session_id: Uuid,
    ) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as::<_, Session>("SELECT * FROM user_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Record activity; last-writer-wins is fine here.
    pub async fn touch_session(&self, session_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE user_sessions SET last_activity = NOW() WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Flip an idle session to inactive (lazy expiry). No logout_time: the
    /// user did not log out, the session timed out.
    pub async fn expire_session(&self, session_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE user_sessions SET is_active = FALSE WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Explicit termination. Guarded on `is_active` so a repeat call keeps
    /// the original logout_time.
    pub async fn terminate_session(&self, session_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE user_sessions
            SET is_active = FALSE, logout_time = NOW()
            WHERE id = $1 AND is_active = TRUE
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn terminate_all_sessions(&self, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE user_sessions
            SET is_active = FALSE, logout_time = NOW()
            WHERE user_id = $1 AND is_active = TRUE
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, sqlx::Error> {
        sqlx::query_as::<_, Session>(
            "SELECT * FROM user_sessions WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn list_active_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, sqlx::Error> {
        sqlx::query_as::<_, Session>(
            r#"
            SELECT * FROM user_sessions
            WHERE user_id = $1 AND is_active = TRUE
            ORDER BY last_activity DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    // ==================== Two-factor ====================

    pub async fn find_two_factor(
        &self,
        user_id: Uuid,
    ) -> Result<Option<TwoFactorCredential>, sqlx::Error> {
        sqlx::query_as::<_, TwoFactorCredential>("SELECT * FROM user_2fa WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Store (or replace) a user's two-factor credential with enabled = true.
    pub async fn upsert_two_factor(
        &self,
        user_id: Uuid,
        secret: &str,
        backup_codes: &[String],
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO user_2fa (user_id, secret, is_enabled, backup_codes, created_at, updated_at)
            VALUES ($1, $2, TRUE, $3, NOW(), NOW())
            ON CONFLICT (user_id)
            DO UPDATE SET secret = $2, is_enabled = TRUE, backup_codes = $3, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(secret)
        .bind(backup_codes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn disable_two_factor(&self, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_2fa SET is_enabled = FALSE, updated_at = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Atomically remove one backup code if (and only if) it is still
    /// present. Returns the remaining count on success, None if the code was
    /// absent - the single UPDATE is what makes double-spends impossible.
    pub async fn consume_backup_code(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<Option<i32>, sqlx::Error> {
        sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE user_2fa
            SET backup_codes = array_remove(backup_codes, $2), updated_at = NOW()
            WHERE user_id = $1 AND is_enabled = TRUE AND $2 = ANY(backup_codes)
            RETURNING COALESCE(cardinality(backup_codes), 0)
            "#,
        )
        .bind(user_id)
        .bind(code)
        .fetch_optional(&self.pool)
        .await
    }

    // ==================== Password reset tokens ====================

    pub async fn insert_reset_token(
        &self,
        token: &PasswordResetToken,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens
                (id, user_id, token, expires_at, used_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.token)
        .bind(token.expires_at)
        .bind(token.used_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_reset_token(
        &self,
        token: &str,
    ) -> Result<Option<PasswordResetToken>, sqlx::Error> {
        sqlx::query_as::<_, PasswordResetToken>(
            "SELECT * FROM password_reset_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
    }

    /// Mark a token used iff it is unused and unexpired, returning the owner.
    /// Exactly one of N concurrent calls can win this UPDATE.
    pub async fn consume_reset_token(&self, token: &str) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE password_reset_tokens
            SET used_at = NOW()
            WHERE token = $1 AND used_at IS NULL AND expires_at > NOW()
            RETURNING user_id
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
    }

    // ==================== Permission grants ====================

    pub async fn list_permission_grants(&self) -> Result<Vec<PermissionGrant>, sqlx::Error> {
        sqlx::query_as::<_, PermissionGrant>(
            "SELECT role, resource, action FROM permissions ORDER BY role, resource, action",
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Insert a grant; duplicate triples are ignored. Returns whether a row
    /// was actually added.
    pub async fn insert_permission_grant(
        &self,
        grant: &PermissionGrant,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO permissions (role, resource, action)
            VALUES ($1, $2, $3)
            ON CONFLICT (role, resource, action) DO NOTHING
            "#,
        )
        .bind(&grant.role)
        .bind(&grant.resource)
        .bind(&grant.action)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_permission_grant(
        &self,
        grant: &PermissionGrant,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM permissions WHERE role = $1 AND resource = $2 AND action = $3",
        )
        .bind(&grant.role)
        .bind(&grant.resource)
        .bind(&grant.action)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // ==================== Audit log ====================

    /// Append-only insert; the audit table has no update or delete path.
    pub async fn insert_audit_log(&self, entry: &AuditLog) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs
                (id, user_id, action, entity_type, entity_id, old_values, new_values,
                 ip_address, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.old_values)
        .bind(&entry.new_values)
        .bind(&entry.ip_address)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
