/// Role model
///
/// # Schema
///
/// ```sql
/// CREATE TABLE roles (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(50) NOT NULL,
///     description TEXT,
///     org_id UUID NOT NULL REFERENCES organisations(id) ON DELETE CASCADE,
///     UNIQUE (name, org_id)
/// );
/// ```
///
/// A role is scoped to one organisation: "owner" in org A and "owner" in
/// org B are distinct rows.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named role within one organisation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    /// Unique role ID (UUID v4)
    pub id: Uuid,

    /// Role label, e.g. "owner"
    pub name: String,

    /// Optional human-readable description
    pub description: Option<String>,

    /// Owning organisation
    pub org_id: Uuid,
}

/// Natural key of a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoleKey<'a> {
    pub name: &'a str,
    pub org_id: Uuid,
}

/// Input for creating a role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRole {
    pub name: String,
    pub org_id: Uuid,
    pub description: Option<String>,
}

impl Role {
    /// Whether this role has the given natural key
    pub fn matches(&self, key: &RoleKey<'_>) -> bool {
        self.name == key.name && self.org_id == key.org_id
    }

    /// Whether a supplied description should be written into this role
    ///
    /// Only fills an absent description; never overwrites.
    pub fn needs_description(&self, supplied: Option<&str>) -> bool {
        self.description.is_none() && supplied.is_some_and(|d| !d.is_empty())
    }
}
