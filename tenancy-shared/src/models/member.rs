/// Member model: binds one user to one role within one organisation
///
/// # Schema
///
/// ```sql
/// CREATE TABLE members (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     org_id UUID NOT NULL REFERENCES organisations(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     role_id UUID NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
///     -- audit columns (see models::audit)
///     UNIQUE (org_id, user_id)
/// );
/// ```
///
/// Members are only created by redeeming an invitation token. The
/// `(org_id, user_id)` unique index keeps role updates unambiguous and turns
/// invitation replay into a no-op.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::audit::Audit;

/// Membership of a user in an organisation with a role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Member {
    /// Unique member ID (UUID v4)
    pub id: Uuid,

    pub org_id: Uuid,

    pub user_id: Uuid,

    pub role_id: Uuid,

    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
}

/// Natural key of a membership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberKey {
    pub org_id: Uuid,
    pub user_id: Uuid,
}

/// Input for creating a member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateMember {
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub role_id: Uuid,
}

impl Member {
    /// Natural key of this member
    pub fn key(&self) -> MemberKey {
        MemberKey {
            org_id: self.org_id,
            user_id: self.user_id,
        }
    }

    /// Whether `user_id` owns this membership
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }
}
