//! Role/permission resolution.
//!
//! Effective permissions for (role, resource) are the union of the compiled
//! default matrix and the dynamic grant rows, resolved against an immutable
//! in-memory snapshot. `refresh` builds a new snapshot and swaps it in whole;
//! readers clone the current `Arc` and can never observe a half-loaded grant
//! set. If a refresh fails the previous snapshot keeps serving.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use crate::models::PermissionGrant;
use crate::services::{Database, ServiceError};

/// Compiled default role matrix shipped with the platform.
///
/// Custom roles defined purely through dynamic grants are possible; they
/// simply have no row here.
const DEFAULT_MATRIX: &[(&str, &[(&str, &[&str])])] = &[
    (
        "admin",
        &[
            ("users", &["create", "read", "update", "delete", "manage_roles", "reset_password", "manage_status"]),
            ("groups", &["create", "read", "update", "delete", "manage_members"]),
            ("user_stories", &["create", "read", "update", "delete", "publish"]),
            ("brds", &["create", "read", "update", "delete", "publish", "comment", "generate"]),
            ("templates", &["create", "read", "update", "delete", "share"]),
            ("documents", &["create", "read", "update", "delete", "share"]),
            ("diagrams", &["create", "read", "update", "delete"]),
            ("reports", &["create", "read", "update", "delete", "export"]),
            ("settings", &["read", "update", "manage_audit_logs", "manage_roles"]),
            ("audit_logs", &["read"]),
            ("dashboard", &["read", "view_analytics"]),
            ("sessions", &["read", "terminate"]),
            ("activity", &["read", "read_all", "export"]),
            ("ai", &["configure", "read", "generate"]),
            ("azure_devops", &["configure", "read", "sync"]),
            ("permissions", &["read"]),
            ("profile", &["read", "update"]),
            ("notifications", &["read", "manage", "send_bulk", "configure"]),
        ],
    ),
    (
        "analyst",
        &[
            ("users", &["read"]),
            ("groups", &["read", "manage_members"]),
            ("user_stories", &["create", "read", "update", "delete"]),
            ("brds", &["create", "read", "update", "delete", "comment", "generate"]),
            ("templates", &["create", "read", "update", "delete"]),
            ("documents", &["create", "read", "update", "delete"]),
            ("diagrams", &["create", "read", "update", "delete"]),
            ("reports", &["create", "read", "export"]),
            ("settings", &["read"]),
            ("dashboard", &["read"]),
            ("sessions", &["read", "terminate"]),
            ("activity", &["read"]),
            ("ai", &["configure", "read", "generate"]),
            ("azure_devops", &["configure", "read", "sync"]),
            ("permissions", &["read"]),
            ("profile", &["read", "update"]),
            ("notifications", &["read"]),
        ],
    ),
    (
        "viewer",
        &[
            ("groups", &["read"]),
            ("user_stories", &["read"]),
            ("brds", &["read", "comment"]),
            ("templates", &["read"]),
            ("documents", &["read"]),
            ("diagrams", &["read"]),
            ("reports", &["read"]),
            ("settings", &["read"]),
            ("dashboard", &["read"]),
            ("sessions", &["read", "terminate"]),
            ("activity", &["read"]),
            ("ai", &["read", "generate"]),
            ("azure_devops", &["read"]),
            ("permissions", &["read"]),
            ("profile", &["read"]),
            ("notifications", &["read"]),
        ],
    ),
];

fn default_actions(role: &str, resource: &str) -> Option<&'static [&'static str]> {
    DEFAULT_MATRIX
        .iter()
        .find(|(r, _)| *r == role)
        .and_then(|(_, resources)| {
            resources
                .iter()
                .find(|(res, _)| *res == resource)
                .map(|(_, actions)| *actions)
        })
}

/// Immutable snapshot of the dynamic grant rows, replaced atomically on
/// refresh. Resolution methods answer from this snapshot plus the compiled
/// defaults; they never touch storage.
#[derive(Debug, Default)]
pub struct GrantSnapshot {
    version: u64,
    dynamic: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl GrantSnapshot {
    pub fn from_rows(version: u64, rows: Vec<PermissionGrant>) -> Self {
        let mut dynamic: BTreeMap<String, BTreeMap<String, BTreeSet<String>>> = BTreeMap::new();
        for row in rows {
            dynamic
                .entry(row.role)
                .or_default()
                .entry(row.resource)
                .or_default()
                .insert(row.action);
        }
        Self { version, dynamic }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Union of compiled defaults and dynamic grants for (role, resource).
    pub fn resolve_actions(&self, role: &str, resource: &str) -> BTreeSet<String> {
        let mut actions: BTreeSet<String> = default_actions(role, resource)
            .unwrap_or(&[])
            .iter()
            .map(|a| (*a).to_string())
            .collect();

        if let Some(dynamic) = self.dynamic.get(role).and_then(|r| r.get(resource)) {
            actions.extend(dynamic.iter().cloned());
        }

        actions
    }

    pub fn check(&self, role: &str, resource: &str, action: &str) -> bool {
        if default_actions(role, resource)
            .map(|actions| actions.contains(&action))
            .unwrap_or(false)
        {
            return true;
        }
        self.dynamic
            .get(role)
            .and_then(|r| r.get(resource))
            .map(|actions| actions.contains(action))
            .unwrap_or(false)
    }

    /// Full effective permission map for a role, resource by resource.
    pub fn role_permissions(&self, role: &str) -> BTreeMap<String, BTreeSet<String>> {
        let mut resources: BTreeSet<String> = DEFAULT_MATRIX
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, res)| res.iter().map(|(name, _)| (*name).to_string()).collect())
            .unwrap_or_default();

        if let Some(dynamic) = self.dynamic.get(role) {
            resources.extend(dynamic.keys().cloned());
        }

        resources
            .into_iter()
            .map(|resource| {
                let actions = self.resolve_actions(role, &resource);
                (resource, actions)
            })
            .collect()
    }

    /// Resources on which the role has at least one action.
    pub fn accessible_resources(&self, role: &str) -> Vec<String> {
        self.role_permissions(role)
            .into_iter()
            .filter(|(_, actions)| !actions.is_empty())
            .map(|(resource, _)| resource)
            .collect()
    }

    /// Every known role: compiled plus any role introduced by dynamic grants.
    pub fn all_roles(&self) -> Vec<String> {
        let mut roles: BTreeSet<String> = DEFAULT_MATRIX
            .iter()
            .map(|(role, _)| (*role).to_string())
            .collect();
        roles.extend(self.dynamic.keys().cloned());
        roles.into_iter().collect()
    }
}

/// Permission resolver service: owns the snapshot cell and the refresh path.
#[derive(Clone)]
pub struct PermissionService {
    db: Database,
    snapshot: Arc<RwLock<Arc<GrantSnapshot>>>,
}

impl PermissionService {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            snapshot: Arc::new(RwLock::new(Arc::new(GrantSnapshot::default()))),
        }
    }

    /// The snapshot current at call time. Cheap: clones an Arc.
    pub fn current(&self) -> Arc<GrantSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Rebuild the snapshot from storage and swap it in. On failure the last
    /// good snapshot keeps serving and the error is reported to the caller
    /// and the logs; request serving is never blocked on this.
    pub async fn refresh(&self) -> Result<u64, ServiceError> {
        let rows = match self.db.list_permission_grants().await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "Permission grant refresh failed; keeping last snapshot");
                return Err(ServiceError::Database(e));
            }
        };

        let next_version = self.current().version() + 1;
        let next = Arc::new(GrantSnapshot::from_rows(next_version, rows));

        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = next;

        tracing::info!(version = next_version, "Permission snapshot refreshed");
        Ok(next_version)
    }

    pub fn check(&self, role: &str, resource: &str, action: &str) -> bool {
        self.current().check(role, resource, action)
    }

    pub fn resolve_actions(&self, role: &str, resource: &str) -> BTreeSet<String> {
        self.current().resolve_actions(role, resource)
    }

    /// Add a dynamic grant and refresh the snapshot.
    pub async fn add_grant(&self, grant: &PermissionGrant) -> Result<bool, ServiceError> {
        let inserted = self.db.insert_permission_grant(grant).await?;
        self.refresh().await?;
        Ok(inserted)
    }

    /// Remove a dynamic grant and refresh the snapshot. Compiled defaults
    /// cannot be removed this way; only dynamic rows are deleted.
    pub async fn remove_grant(&self, grant: &PermissionGrant) -> Result<u64, ServiceError> {
        let deleted = self.db.delete_permission_grant(grant).await?;
        self.refresh().await?;
        Ok(deleted)
    }

    pub async fn list_grants(&self) -> Result<Vec<PermissionGrant>, ServiceError> {
        Ok(self.db.list_permission_grants().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(role: &str, resource: &str, action: &str) -> PermissionGrant {
        PermissionGrant {
            role: role.to_string(),
            resource: resource.to_string(),
            action: action.to_string(),
        }
    }

    #[test]
    fn viewer_documents_defaults_to_read_only() {
        let snapshot = GrantSnapshot::from_rows(1, vec![]);
        let actions = snapshot.resolve_actions("viewer", "documents");
        assert_eq!(actions.into_iter().collect::<Vec<_>>(), vec!["read"]);
    }

    #[test]
    fn dynamic_grant_unions_with_defaults() {
        let snapshot =
            GrantSnapshot::from_rows(1, vec![grant("viewer", "documents", "create")]);
        let actions = snapshot.resolve_actions("viewer", "documents");
        assert_eq!(
            actions.into_iter().collect::<Vec<_>>(),
            vec!["create", "read"]
        );
    }

    #[test]
    fn check_consults_both_sources() {
        let snapshot = GrantSnapshot::from_rows(1, vec![grant("viewer", "reports", "export")]);
        assert!(snapshot.check("viewer", "reports", "read")); // default
        assert!(snapshot.check("viewer", "reports", "export")); // dynamic
        assert!(!snapshot.check("viewer", "reports", "delete"));
    }

    #[test]
    fn unknown_role_has_no_defaults() {
        let snapshot = GrantSnapshot::from_rows(1, vec![]);
        assert!(snapshot.resolve_actions("contractor", "documents").is_empty());
        assert!(!snapshot.check("contractor", "documents", "read"));
    }

    #[test]
    fn custom_role_exists_through_dynamic_grants_only() {
        let snapshot =
            GrantSnapshot::from_rows(1, vec![grant("contractor", "documents", "read")]);
        assert!(snapshot.check("contractor", "documents", "read"));
        assert!(snapshot.all_roles().contains(&"contractor".to_string()));
        assert_eq!(snapshot.accessible_resources("contractor"), vec!["documents"]);
    }

    #[test]
    fn resolution_is_pure_per_snapshot() {
        let snapshot = GrantSnapshot::from_rows(3, vec![grant("viewer", "documents", "share")]);
        let first = snapshot.resolve_actions("viewer", "documents");
        let second = snapshot.resolve_actions("viewer", "documents");
        assert_eq!(first, second);
        assert_eq!(snapshot.version(), 3);
    }

    #[test]
    fn viewer_has_no_users_access() {
        let snapshot = GrantSnapshot::from_rows(1, vec![]);
        assert!(snapshot.resolve_actions("viewer", "users").is_empty());
        assert!(!snapshot
            .accessible_resources("viewer")
            .contains(&"users".to_string()));
    }

    #[test]
    fn admin_matrix_spot_checks() {
        let snapshot = GrantSnapshot::from_rows(1, vec![]);
        assert!(snapshot.check("admin", "users", "manage_roles"));
        assert!(snapshot.check("admin", "sessions", "terminate"));
        assert!(snapshot.check("admin", "settings", "manage_roles"));
        assert!(!snapshot.check("analyst", "users", "delete"));
    }
}
