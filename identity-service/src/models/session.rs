//! Session model - one row per login instance, multi-device.
//!
//! Rows are never deleted; terminated and expired sessions stay behind as the
//! historical record for the audit trail.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Outcome of a liveness check against a session row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Active and within the idle timeout.
    Live,
    /// `is_active` already false (logout or admin termination).
    Terminated,
    /// Still marked active in storage but idle past the timeout.
    Expired,
}

/// Session entity.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
    pub logout_time: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(user_id: Uuid, ip_address: String, user_agent: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            ip_address,
            user_agent,
            created_at: now,
            last_activity: now,
            is_active: true,
            logout_time: None,
        }
    }

    /// Minutes since last recorded activity.
    pub fn idle_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_activity).num_minutes()
    }

    /// Classify the session against the idle timeout. Pure; the storage-side
    /// state flip for Expired is the caller's job.
    ///
    /// An inactive row with a logout_time was terminated on purpose; one
    /// without timed out, and keeps reporting Expired on every later check.
    pub fn status(&self, timeout_minutes: i64, now: DateTime<Utc>) -> SessionStatus {
        if !self.is_active {
            return if self.logout_time.is_some() {
                SessionStatus::Terminated
            } else {
                SessionStatus::Expired
            };
        }
        if self.idle_minutes(now) > timeout_minutes {
            return SessionStatus::Expired;
        }
        SessionStatus::Live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session() -> Session {
        Session::new(
            Uuid::new_v4(),
            "127.0.0.1".to_string(),
            "test-agent".to_string(),
        )
    }

    #[test]
    fn fresh_session_is_live() {
        let s = session();
        assert_eq!(s.status(30, Utc::now()), SessionStatus::Live);
    }

    #[test]
    fn idle_past_timeout_is_expired() {
        let mut s = session();
        s.last_activity = Utc::now() - Duration::minutes(40);
        assert_eq!(s.status(30, Utc::now()), SessionStatus::Expired);
    }

    #[test]
    fn idle_under_timeout_is_live() {
        let mut s = session();
        s.last_activity = Utc::now() - Duration::minutes(29);
        assert_eq!(s.status(30, Utc::now()), SessionStatus::Live);
    }

    #[test]
    fn terminated_wins_over_expiry() {
        let mut s = session();
        s.is_active = false;
        s.logout_time = Some(Utc::now());
        s.last_activity = Utc::now() - Duration::minutes(40);
        assert_eq!(s.status(30, Utc::now()), SessionStatus::Terminated);
    }

    #[test]
    fn lazily_expired_session_keeps_reporting_expired() {
        let mut s = session();
        s.is_active = false;
        s.logout_time = None;
        assert_eq!(s.status(30, Utc::now()), SessionStatus::Expired);
    }
}
