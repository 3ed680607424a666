//! Append-only audit sink.
//!
//! A failed audit write never fails or rolls back the operation that
//! triggered it, but it is always logged at error level so a silently-lost
//! trail cannot happen.

use crate::models::AuditLog;
use crate::services::Database;

#[derive(Clone)]
pub struct AuditService {
    db: Database,
}

impl AuditService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append an entry, waiting for the insert. At-least-attempt: errors are
    /// logged, not propagated.
    pub async fn record(&self, entry: AuditLog) {
        if let Err(e) = self.db.insert_audit_log(&entry).await {
            tracing::error!(
                error = %e,
                action = %entry.action,
                entity_type = %entry.entity_type,
                "Failed to write audit log entry"
            );
        }
    }

    /// Append an entry without blocking the caller.
    pub fn record_async(&self, entry: AuditLog) {
        let db = self.db.clone();
        tokio::spawn(async move {
            if let Err(e) = db.insert_audit_log(&entry).await {
                tracing::error!(
                    error = %e,
                    action = %entry.action,
                    entity_type = %entry.entity_type,
                    "Failed to write audit log entry"
                );
            }
        });
    }
}
