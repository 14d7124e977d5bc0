/// Organisation model
///
/// # Schema
///
/// ```sql
/// CREATE TABLE organisations (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(50) NOT NULL UNIQUE,
///     personal BOOLEAN NOT NULL DEFAULT FALSE,
///     -- audit columns (see models::audit)
/// );
/// ```
///
/// Organisations are looked up and created by name (get-or-create), so the
/// unique index on `name` is what makes concurrent registrations under the
/// same name converge on one row.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::audit::Audit;

/// A tenant: owns its roles and members
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Organisation {
    /// Unique organisation ID (UUID v4)
    pub id: Uuid,

    /// Organisation name
    pub name: String,

    /// Auto-created single-user organisation
    pub personal: bool,

    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
}

/// Input for creating an organisation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrganisation {
    pub name: String,
    pub personal: bool,
}

impl CreateOrganisation {
    /// Shared (non-personal) organisation
    pub fn shared(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            personal: false,
        }
    }
}
