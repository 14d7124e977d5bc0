/// PostgreSQL store
///
/// Each [`UnitOfWork`] wraps one `sqlx` transaction. Natural-key inserts use
/// `ON CONFLICT DO NOTHING` so a taken key returns no row without aborting
/// the surrounding transaction.
///
/// # Example
///
/// ```no_run
/// use tenancy_shared::db::pool::{create_pool, DatabaseConfig};
/// use tenancy_shared::store::{postgres::PgStore, Store};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig {
///     url: std::env::var("DATABASE_URL")?,
///     ..Default::default()
/// })
/// .await?;
///
/// let store = PgStore::new(pool);
/// store.health_check().await?;
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::{Store, StoreError, StoreResult, UnitOfWork};
use crate::db::pool::health_check;
use crate::models::{
    CreateMember, CreateOrganisation, CreateRole, CreateUser, Member, MemberKey, Organisation,
    Role, RoleKey, User, UserLookup,
};
use crate::reporting::{OrgMemberCount, OrgRoleUserCount, RoleUserCount, TimeRange};

const USER_COLUMNS: &str =
    "id, email, password_hash, profile, status, settings, created_at, updated_at";
const ORGANISATION_COLUMNS: &str = "id, name, personal, status, settings, created_at, updated_at";
const ROLE_COLUMNS: &str = "id, name, description, org_id";
const MEMBER_COLUMNS: &str = "id, org_id, user_id, role_id, status, settings, created_at, updated_at";

/// Store backed by a PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wraps an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn range_bounds(
    range: Option<TimeRange>,
) -> (Option<chrono::DateTime<chrono::Utc>>, Option<chrono::DateTime<chrono::Utc>>) {
    match range {
        Some(r) => (Some(r.from), Some(r.to)),
        None => (None, None),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn health_check(&self) -> StoreResult<()> {
        health_check(&self.pool).await?;
        Ok(())
    }

    async fn users_per_role(&self) -> StoreResult<Vec<RoleUserCount>> {
        let rows = sqlx::query_as::<_, RoleUserCount>(
            r#"
            SELECT r.id AS role_id, r.name AS role, COUNT(u.id) AS count
            FROM roles r
            JOIN members m ON m.role_id = r.id
            JOIN users u ON u.id = m.user_id
            GROUP BY r.id, r.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn members_per_organisation(
        &self,
        range: Option<TimeRange>,
    ) -> StoreResult<Vec<OrgMemberCount>> {
        let (from, to) = range_bounds(range);

        let rows = sqlx::query_as::<_, OrgMemberCount>(
            r#"
            SELECT o.id AS organisation_id, o.name AS organisation, COUNT(m.id) AS count
            FROM organisations o
            JOIN members m ON m.org_id = o.id
            WHERE ($1::timestamptz IS NULL OR m.created_at BETWEEN $1 AND $2)
            GROUP BY o.id, o.name
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn users_per_organisation_role(
        &self,
        range: Option<TimeRange>,
    ) -> StoreResult<Vec<OrgRoleUserCount>> {
        let (from, to) = range_bounds(range);

        let rows = sqlx::query_as::<_, OrgRoleUserCount>(
            r#"
            SELECT o.id AS organisation_id, o.name AS organisation_name,
                   r.id AS role_id, r.name AS role_name, COUNT(u.id) AS user_count
            FROM organisations o
            JOIN members m ON m.org_id = o.id
            JOIN roles r ON r.id = m.role_id
            JOIN users u ON u.id = m.user_id
            WHERE ($1::timestamptz IS NULL OR u.created_at BETWEEN $1 AND $2)
            GROUP BY o.id, o.name, r.id, r.name
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

/// Unit of work over one PostgreSQL transaction
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn find_user(&mut self, lookup: UserLookup<'_>) -> StoreResult<Option<User>> {
        let user = match lookup {
            UserLookup::ById(id) => {
                sqlx::query_as::<_, User>(&format!(
                    "SELECT {} FROM users WHERE id = $1",
                    USER_COLUMNS
                ))
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?
            }
            UserLookup::ByEmail(email) => {
                sqlx::query_as::<_, User>(&format!(
                    "SELECT {} FROM users WHERE email = $1",
                    USER_COLUMNS
                ))
                .bind(email)
                .fetch_optional(&mut *self.tx)
                .await?
            }
        };

        Ok(user)
    }

    async fn insert_user(&mut self, data: CreateUser) -> StoreResult<Option<User>> {
        let profile = data.profile.unwrap_or_else(|| serde_json::json!({}));

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash, profile)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO NOTHING
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(data.email)
        .bind(data.password_hash)
        .bind(profile)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn update_user_password(
        &mut self,
        user_id: Uuid,
        password_hash: &str,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_organisation_by_name(&mut self, name: &str) -> StoreResult<Option<Organisation>> {
        let organisation = sqlx::query_as::<_, Organisation>(&format!(
            "SELECT {} FROM organisations WHERE name = $1",
            ORGANISATION_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(organisation)
    }

    async fn insert_organisation(
        &mut self,
        data: CreateOrganisation,
    ) -> StoreResult<Option<Organisation>> {
        let organisation = sqlx::query_as::<_, Organisation>(&format!(
            r#"
            INSERT INTO organisations (name, personal)
            VALUES ($1, $2)
            ON CONFLICT (name) DO NOTHING
            RETURNING {}
            "#,
            ORGANISATION_COLUMNS
        ))
        .bind(data.name)
        .bind(data.personal)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(organisation)
    }

    async fn find_role(&mut self, key: RoleKey<'_>) -> StoreResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(&format!(
            "SELECT {} FROM roles WHERE name = $1 AND org_id = $2",
            ROLE_COLUMNS
        ))
        .bind(key.name)
        .bind(key.org_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(role)
    }

    async fn find_role_by_id(&mut self, id: Uuid) -> StoreResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(&format!(
            "SELECT {} FROM roles WHERE id = $1",
            ROLE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(role)
    }

    async fn insert_role(&mut self, data: CreateRole) -> StoreResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(&format!(
            r#"
            INSERT INTO roles (name, description, org_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (name, org_id) DO NOTHING
            RETURNING {}
            "#,
            ROLE_COLUMNS
        ))
        .bind(data.name)
        .bind(data.description)
        .bind(data.org_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(role)
    }

    async fn set_role_description(
        &mut self,
        role_id: Uuid,
        description: &str,
    ) -> StoreResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(&format!(
            "UPDATE roles SET description = $2 WHERE id = $1 RETURNING {}",
            ROLE_COLUMNS
        ))
        .bind(role_id)
        .bind(description)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(role)
    }

    async fn find_member(&mut self, key: MemberKey) -> StoreResult<Option<Member>> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "SELECT {} FROM members WHERE org_id = $1 AND user_id = $2",
            MEMBER_COLUMNS
        ))
        .bind(key.org_id)
        .bind(key.user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(member)
    }

    async fn find_member_by_id(&mut self, id: Uuid) -> StoreResult<Option<Member>> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "SELECT {} FROM members WHERE id = $1",
            MEMBER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(member)
    }

    async fn insert_member(&mut self, data: CreateMember) -> StoreResult<Option<Member>> {
        let result = sqlx::query_as::<_, Member>(&format!(
            r#"
            INSERT INTO members (org_id, user_id, role_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (org_id, user_id) DO NOTHING
            RETURNING {}
            "#,
            MEMBER_COLUMNS
        ))
        .bind(data.org_id)
        .bind(data.user_id)
        .bind(data.role_id)
        .fetch_optional(&mut *self.tx)
        .await;

        match result {
            Ok(member) => Ok(member),
            Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                debug!(constraint = ?db_err.constraint(), "Member insert references missing row");
                Err(StoreError::MissingReference("user, organisation or role"))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_members(&mut self, org_id: Uuid) -> StoreResult<Vec<Member>> {
        let members = sqlx::query_as::<_, Member>(&format!(
            "SELECT {} FROM members WHERE org_id = $1 ORDER BY created_at ASC",
            MEMBER_COLUMNS
        ))
        .bind(org_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(members)
    }

    async fn update_member_role(
        &mut self,
        member_id: Uuid,
        role_id: Uuid,
    ) -> StoreResult<Option<Member>> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "UPDATE members SET role_id = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            MEMBER_COLUMNS
        ))
        .bind(member_id)
        .bind(role_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(member)
    }

    async fn delete_member(&mut self, member_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM members WHERE id = $1")
            .bind(member_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
