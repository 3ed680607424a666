//! Session lifecycle: create, validate with lazy idle-timeout expiry,
//! terminate (single or all devices).
//!
//! These operations are the only writers of `is_active` and `last_activity`.
//! There is no background sweeper: an idle session is flipped inactive the
//! next time something asks about it.

use uuid::Uuid;

use crate::models::{Session, SessionStatus};
use crate::services::{Database, ServiceError};

#[derive(Clone)]
pub struct SessionService {
    db: Database,
    timeout_minutes: i64,
}

impl SessionService {
    pub fn new(db: Database, timeout_minutes: i64) -> Self {
        Self {
            db,
            timeout_minutes,
        }
    }

    pub fn timeout_minutes(&self) -> i64 {
        self.timeout_minutes
    }

    /// Create a session for a login instance. Multiple concurrent sessions
    /// per user are expected (multi-device).
    pub async fn create(
        &self,
        user_id: Uuid,
        ip_address: String,
        user_agent: String,
    ) -> Result<Session, ServiceError> {
        let session = Session::new(user_id, ip_address, user_agent);
        self.db.insert_session(&session).await?;

        tracing::debug!(session_id = %session.id, user_id = %user_id, "Session created");
        Ok(session)
    }

    /// Validate liveness and touch `last_activity`.
    ///
    /// An idle session past the timeout is flipped inactive in storage before
    /// the `SessionExpired` error is returned, so every later validation of
    /// the same session fails as Terminated-or-Expired consistently.
    pub async fn validate(&self, session_id: Uuid) -> Result<Session, ServiceError> {
        let session = self
            .db
            .find_session_by_id(session_id)
            .await?
            .ok_or(ServiceError::SessionNotFound)?;

        match session.status(self.timeout_minutes, chrono::Utc::now()) {
            SessionStatus::Terminated => Err(ServiceError::SessionTerminated),
            SessionStatus::Expired => {
                if session.is_active {
                    tracing::info!(
                        session_id = %session.id,
                        user_id = %session.user_id,
                        idle_minutes = session.idle_minutes(chrono::Utc::now()),
                        "Session idle past timeout; expiring"
                    );
                    self.db.expire_session(session.id).await?;
                }
                Err(ServiceError::SessionExpired)
            }
            SessionStatus::Live => {
                self.db.touch_session(session.id).await?;
                Ok(session)
            }
        }
    }

    /// Fetch without touching or expiring; used by the session listing
    /// endpoints, which must show terminated sessions too.
    pub async fn get(&self, session_id: Uuid) -> Result<Session, ServiceError> {
        self.db
            .find_session_by_id(session_id)
            .await?
            .ok_or(ServiceError::SessionNotFound)
    }

    /// Idempotent termination; a repeat call is a no-op.
    pub async fn terminate(&self, session_id: Uuid) -> Result<(), ServiceError> {
        self.db.terminate_session(session_id).await?;
        Ok(())
    }

    /// Terminate every active session the user owns. Sessions of other users
    /// are untouched. Returns how many were terminated.
    pub async fn terminate_all(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let count = self.db.terminate_all_sessions(user_id).await?;
        tracing::info!(user_id = %user_id, count, "Terminated all sessions for user");
        Ok(count)
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Session>, ServiceError> {
        Ok(self.db.list_sessions(user_id).await?)
    }

    pub async fn list_active(&self, user_id: Uuid) -> Result<Vec<Session>, ServiceError> {
        Ok(self.db.list_active_sessions(user_id).await?)
    }
}
