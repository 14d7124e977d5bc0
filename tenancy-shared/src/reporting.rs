/// Read-only membership statistics
///
/// Rows come from the [`Store`] reporting queries; this module folds them
/// into name-keyed maps for presentation. Maps are ordered so responses are
/// stable.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tenancy_shared::reporting::{ReportingService, TimeRange};
/// use tenancy_shared::store::memory::MemoryStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let reporting = ReportingService::new(Arc::new(MemoryStore::new()));
///
/// let per_role = reporting.users_per_role().await?;
/// let per_org = reporting.members_per_organisation(None).await?;
/// # Ok(())
/// # }
/// ```

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::store::{Store, StoreResult};

/// Inclusive creation-time window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    /// Builds a window only when both bounds are present
    ///
    /// A single bound is ignored rather than treated as open-ended.
    pub fn from_bounds(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Option<Self> {
        match (from, to) {
            (Some(from), Some(to)) => Some(Self { from, to }),
            _ => None,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at <= self.to
    }
}

/// Users holding one role row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct RoleUserCount {
    pub role_id: Uuid,
    pub role: String,
    pub count: i64,
}

/// Members of one organisation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct OrgMemberCount {
    pub organisation_id: Uuid,
    pub organisation: String,
    pub count: i64,
}

/// Users holding one role within one organisation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct OrgRoleUserCount {
    pub organisation_id: Uuid,
    pub organisation_name: String,
    pub role_id: Uuid,
    pub role_name: String,
    pub user_count: i64,
}

/// Role name to user count
pub type RoleCounts = BTreeMap<String, i64>;

/// Organisation name to member count
pub type OrganisationCounts = BTreeMap<String, i64>;

/// Organisation name to role name to user count
pub type OrganisationRoleCounts = BTreeMap<String, BTreeMap<String, i64>>;

/// Aggregate statistics over the membership tables
#[derive(Clone)]
pub struct ReportingService {
    store: Arc<dyn Store>,
}

impl ReportingService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Users per role name
    ///
    /// Roles are scoped to organisations, so the same name appears once per
    /// organisation in the raw rows. Those rows are summed under the name.
    pub async fn users_per_role(&self) -> StoreResult<RoleCounts> {
        let rows = self.store.users_per_role().await?;

        let mut counts = RoleCounts::new();
        for row in rows {
            *counts.entry(row.role).or_insert(0) += row.count;
        }

        Ok(counts)
    }

    /// Members per organisation, optionally limited to members created in `range`
    pub async fn members_per_organisation(
        &self,
        range: Option<TimeRange>,
    ) -> StoreResult<OrganisationCounts> {
        let rows = self.store.members_per_organisation(range).await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.organisation, row.count))
            .collect())
    }

    /// Users per role per organisation, optionally limited to users created in `range`
    pub async fn users_per_organisation_role(
        &self,
        range: Option<TimeRange>,
    ) -> StoreResult<OrganisationRoleCounts> {
        let rows = self.store.users_per_organisation_role(range).await?;

        let mut counts = OrganisationRoleCounts::new();
        for row in rows {
            counts
                .entry(row.organisation_name)
                .or_default()
                .insert(row.role_name, row.user_count);
        }

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_time_range_requires_both_bounds() {
        let now = Utc::now();
        assert!(TimeRange::from_bounds(Some(now), None).is_none());
        assert!(TimeRange::from_bounds(None, Some(now)).is_none());
        assert!(TimeRange::from_bounds(None, None).is_none());
        assert!(TimeRange::from_bounds(Some(now), Some(now)).is_some());
    }

    #[test]
    fn test_time_range_is_inclusive() {
        let from = Utc::now();
        let to = from + Duration::hours(1);
        let range = TimeRange { from, to };

        assert!(range.contains(from));
        assert!(range.contains(to));
        assert!(!range.contains(to + Duration::seconds(1)));
        assert!(!range.contains(from - Duration::seconds(1)));
    }
}
