/// Shared bookkeeping fields for persisted entities
///
/// Users, organisations and members embed an [`Audit`] value instead of
/// inheriting from a common base. The columns are flattened into each
/// entity's table and JSON representation.
///
/// # Schema fragment
///
/// ```sql
/// status     INTEGER     NOT NULL DEFAULT 0,
/// settings   JSONB       NOT NULL DEFAULT '{}',
/// created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
/// updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Status, settings and timestamps common to auditable entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Audit {
    /// Application-defined status flag (0 = active)
    pub status: i32,

    /// Arbitrary per-entity settings (JSON object)
    pub settings: JsonValue,

    /// When the row was created
    pub created_at: DateTime<Utc>,

    /// When the row was last modified
    pub updated_at: DateTime<Utc>,
}

impl Audit {
    /// Fresh audit fields stamped with the current time
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            status: 0,
            settings: JsonValue::Object(Default::default()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Bumps `updated_at` to now
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for Audit {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_audit_defaults() {
        let audit = Audit::new();
        assert_eq!(audit.status, 0);
        assert_eq!(audit.settings, serde_json::json!({}));
        assert_eq!(audit.created_at, audit.updated_at);
    }

    #[test]
    fn test_touch_moves_updated_at_forward() {
        let mut audit = Audit::new();
        let before = audit.updated_at;
        audit.touch();
        assert!(audit.updated_at >= before);
        assert_eq!(audit.created_at, before);
    }
}
