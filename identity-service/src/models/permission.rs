//! Permission grant model - dynamic (role, resource, action) rows.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// A dynamic grant row. The triple is uniquely keyed in storage; the full
/// grant set for a role is the union of these rows and the compiled defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PermissionGrant {
    pub role: String,
    pub resource: String,
    pub action: String,
}
