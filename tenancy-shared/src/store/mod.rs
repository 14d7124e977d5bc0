/// Persistence contract
///
/// Workflows never talk to a database directly. They open a [`UnitOfWork`]
/// through a [`Store`], perform typed lookups and writes on it, and then
/// either commit or drop it. Dropping an uncommitted unit of work discards
/// every write made through it.
///
/// # Backends
///
/// - [`postgres::PgStore`]: PostgreSQL via `sqlx`, one database transaction
///   per unit of work
/// - [`memory::MemoryStore`]: in-process tables with buffered writes, used by
///   tests and local development
///
/// # Uniqueness
///
/// Inserts on a natural key (`users.email`, `organisations.name`,
/// `roles(name, org_id)`, `members(org_id, user_id)`) are insert-if-absent:
/// they return `Ok(None)` instead of failing when the key is taken. Callers
/// implementing get-or-create re-read on `None`, which keeps concurrent
/// get-or-create calls from producing duplicates or spurious errors.
///
/// # Example
///
/// ```no_run
/// use tenancy_shared::models::UserLookup;
/// use tenancy_shared::store::{memory::MemoryStore, Store};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::new();
/// let mut uow = store.begin().await?;
/// let user = uow.find_user(UserLookup::ByEmail("a@x.com")).await?;
/// assert!(user.is_none());
/// uow.commit().await?;
/// # Ok(())
/// # }
/// ```

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    CreateMember, CreateOrganisation, CreateRole, CreateUser, Member, MemberKey, Organisation,
    Role, RoleKey, User, UserLookup,
};
use crate::reporting::{OrgMemberCount, OrgRoleUserCount, RoleUserCount, TimeRange};

/// Error type for persistence operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Write references a row that does not exist
    #[error("Referenced {0} does not exist")]
    MissingReference(&'static str),

    /// Commit lost a race with a concurrent unit of work
    #[error("Write conflict: {0}")]
    Conflict(String),
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Entry point to a persistence backend
#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a new unit of work
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;

    /// Verifies the backend is reachable
    async fn health_check(&self) -> StoreResult<()>;

    /// Number of users per role, one entry per role row
    async fn users_per_role(&self) -> StoreResult<Vec<RoleUserCount>>;

    /// Number of members per organisation, filtered on member creation time
    async fn members_per_organisation(
        &self,
        range: Option<TimeRange>,
    ) -> StoreResult<Vec<OrgMemberCount>>;

    /// Number of users per (organisation, role), filtered on user creation time
    async fn users_per_organisation_role(
        &self,
        range: Option<TimeRange>,
    ) -> StoreResult<Vec<OrgRoleUserCount>>;
}

/// One all-or-nothing sequence of reads and writes
///
/// Reads observe this unit of work's own writes.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn find_user(&mut self, lookup: UserLookup<'_>) -> StoreResult<Option<User>>;

    /// Inserts a user; `None` if the email is taken
    async fn insert_user(&mut self, data: CreateUser) -> StoreResult<Option<User>>;

    /// Overwrites a user's password hash; `false` if the user does not exist
    async fn update_user_password(&mut self, user_id: Uuid, password_hash: &str)
        -> StoreResult<bool>;

    async fn find_organisation_by_name(&mut self, name: &str) -> StoreResult<Option<Organisation>>;

    /// Inserts an organisation; `None` if the name is taken
    async fn insert_organisation(
        &mut self,
        data: CreateOrganisation,
    ) -> StoreResult<Option<Organisation>>;

    async fn find_role(&mut self, key: RoleKey<'_>) -> StoreResult<Option<Role>>;

    async fn find_role_by_id(&mut self, id: Uuid) -> StoreResult<Option<Role>>;

    /// Inserts a role; `None` if `(name, org_id)` is taken
    async fn insert_role(&mut self, data: CreateRole) -> StoreResult<Option<Role>>;

    /// Sets a role's description; `None` if the role does not exist
    async fn set_role_description(
        &mut self,
        role_id: Uuid,
        description: &str,
    ) -> StoreResult<Option<Role>>;

    async fn find_member(&mut self, key: MemberKey) -> StoreResult<Option<Member>>;

    async fn find_member_by_id(&mut self, id: Uuid) -> StoreResult<Option<Member>>;

    /// Inserts a member; `None` if `(org_id, user_id)` is taken
    async fn insert_member(&mut self, data: CreateMember) -> StoreResult<Option<Member>>;

    async fn list_members(&mut self, org_id: Uuid) -> StoreResult<Vec<Member>>;

    /// Points a member at another role; `None` if the member does not exist
    async fn update_member_role(
        &mut self,
        member_id: Uuid,
        role_id: Uuid,
    ) -> StoreResult<Option<Member>>;

    /// Deletes a member; `false` if it did not exist
    async fn delete_member(&mut self, member_id: Uuid) -> StoreResult<bool>;

    /// Makes every write visible to other units of work
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discards every write
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
