/// In-memory store
///
/// Tables live behind one shared mutex. A unit of work takes a private
/// snapshot when it begins, applies its writes to that snapshot (so it reads
/// its own writes), and records them in a journal. Commit replays the journal
/// against the current shared tables, re-checking every unique key and
/// reference, and swaps the result in only if the whole replay succeeds.
/// A replay that trips over a concurrent commit fails with
/// [`StoreError::Conflict`] and leaves the shared tables untouched.
///
/// Inserting a natural key (email, organisation name, role name within an
/// organisation, member of an organisation) claims that key until the unit
/// of work ends. A second unit of work inserting the same key waits for the
/// claim to be released, then sees the committed row, adopts it into its
/// snapshot and reports the key as taken. Concurrent get-or-create calls
/// therefore converge on one row, as with a unique index in PostgreSQL.
///
/// Dropping a unit of work without committing discards its journal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use super::{Store, StoreError, StoreResult, UnitOfWork};
use crate::models::{
    Audit, CreateMember, CreateOrganisation, CreateRole, CreateUser, Member, MemberKey,
    Organisation, Role, RoleKey, User, UserLookup,
};
use crate::reporting::{OrgMemberCount, OrgRoleUserCount, RoleUserCount, TimeRange};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: Vec<User>,
    organisations: Vec<Organisation>,
    roles: Vec<Role>,
    members: Vec<Member>,
}

#[derive(Debug, Clone)]
enum Mutation {
    InsertUser(User),
    SetPassword { user_id: Uuid, password_hash: String },
    InsertOrganisation(Organisation),
    InsertRole(Role),
    SetRoleDescription { role_id: Uuid, description: String },
    InsertMember(Member),
    SetMemberRole { member_id: Uuid, role_id: Uuid },
    DeleteMember(Uuid),
}

/// Natural key guarded by a unique index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum UniqueKey {
    Email(String),
    OrganisationName(String),
    Role(String, Uuid),
    Member(Uuid, Uuid),
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,

    /// Keys inserted by units of work that have not ended yet
    claims: Mutex<HashMap<UniqueKey, Arc<Notify>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A poisoned lock only means another test thread panicked mid-commit;
    // the tables themselves are swapped atomically.
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn conflict(what: &str) -> StoreError {
    StoreError::Conflict(what.to_string())
}

impl Tables {
    fn user(&self, lookup: &UserLookup<'_>) -> Option<&User> {
        self.users.iter().find(|u| u.matches(lookup))
    }

    fn role(&self, key: &RoleKey<'_>) -> Option<&Role> {
        self.roles.iter().find(|r| r.matches(key))
    }

    fn member(&self, key: &MemberKey) -> Option<&Member> {
        self.members.iter().find(|m| m.key() == *key)
    }

    /// Applies one mutation, enforcing unique keys and references
    fn apply(&mut self, mutation: &Mutation) -> StoreResult<()> {
        match mutation {
            Mutation::InsertUser(user) => {
                if self.user(&UserLookup::ByEmail(&user.email)).is_some() {
                    return Err(conflict("users.email"));
                }
                self.users.push(user.clone());
            }
            Mutation::SetPassword {
                user_id,
                password_hash,
            } => {
                let user = self
                    .users
                    .iter_mut()
                    .find(|u| u.id == *user_id)
                    .ok_or_else(|| conflict("users.id"))?;
                user.password_hash = password_hash.clone();
                user.audit.touch();
            }
            Mutation::InsertOrganisation(organisation) => {
                if self.organisations.iter().any(|o| o.name == organisation.name) {
                    return Err(conflict("organisations.name"));
                }
                self.organisations.push(organisation.clone());
            }
            Mutation::InsertRole(role) => {
                if !self.organisations.iter().any(|o| o.id == role.org_id) {
                    return Err(StoreError::MissingReference("organisation"));
                }
                let key = RoleKey {
                    name: &role.name,
                    org_id: role.org_id,
                };
                if self.role(&key).is_some() {
                    return Err(conflict("roles(name, org_id)"));
                }
                self.roles.push(role.clone());
            }
            Mutation::SetRoleDescription {
                role_id,
                description,
            } => {
                let role = self
                    .roles
                    .iter_mut()
                    .find(|r| r.id == *role_id)
                    .ok_or_else(|| conflict("roles.id"))?;
                role.description = Some(description.clone());
            }
            Mutation::InsertMember(member) => {
                if !self.users.iter().any(|u| u.id == member.user_id) {
                    return Err(StoreError::MissingReference("user"));
                }
                if !self.organisations.iter().any(|o| o.id == member.org_id) {
                    return Err(StoreError::MissingReference("organisation"));
                }
                if !self.roles.iter().any(|r| r.id == member.role_id) {
                    return Err(StoreError::MissingReference("role"));
                }
                if self.member(&member.key()).is_some() {
                    return Err(conflict("members(org_id, user_id)"));
                }
                self.members.push(member.clone());
            }
            Mutation::SetMemberRole { member_id, role_id } => {
                if !self.roles.iter().any(|r| r.id == *role_id) {
                    return Err(StoreError::MissingReference("role"));
                }
                let member = self
                    .members
                    .iter_mut()
                    .find(|m| m.id == *member_id)
                    .ok_or_else(|| conflict("members.id"))?;
                member.role_id = *role_id;
                member.audit.touch();
            }
            Mutation::DeleteMember(member_id) => {
                // Deleting an already-deleted row is not a conflict
                self.members.retain(|m| m.id != *member_id);
            }
        }

        Ok(())
    }
}

/// Store keeping all tables in process memory
///
/// Cloning yields another handle to the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Tables {
        lock(&self.shared.tables).clone()
    }
}

fn in_range(at: chrono::DateTime<Utc>, range: &Option<TimeRange>) -> bool {
    range.as_ref().map_or(true, |r| r.contains(at))
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(MemoryUnitOfWork {
            shared: Arc::clone(&self.shared),
            working: self.snapshot(),
            journal: Vec::new(),
            claimed: Vec::new(),
        }))
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn users_per_role(&self) -> StoreResult<Vec<RoleUserCount>> {
        let tables = self.snapshot();

        let counts = tables
            .roles
            .iter()
            .filter_map(|role| {
                let count = tables
                    .members
                    .iter()
                    .filter(|m| m.role_id == role.id)
                    .filter(|m| tables.users.iter().any(|u| u.id == m.user_id))
                    .count() as i64;

                (count > 0).then(|| RoleUserCount {
                    role_id: role.id,
                    role: role.name.clone(),
                    count,
                })
            })
            .collect();

        Ok(counts)
    }

    async fn members_per_organisation(
        &self,
        range: Option<TimeRange>,
    ) -> StoreResult<Vec<OrgMemberCount>> {
        let tables = self.snapshot();

        let counts = tables
            .organisations
            .iter()
            .filter_map(|org| {
                let count = tables
                    .members
                    .iter()
                    .filter(|m| m.org_id == org.id && in_range(m.audit.created_at, &range))
                    .count() as i64;

                (count > 0).then(|| OrgMemberCount {
                    organisation_id: org.id,
                    organisation: org.name.clone(),
                    count,
                })
            })
            .collect();

        Ok(counts)
    }

    async fn users_per_organisation_role(
        &self,
        range: Option<TimeRange>,
    ) -> StoreResult<Vec<OrgRoleUserCount>> {
        let tables = self.snapshot();
        let mut counts = Vec::new();

        for org in &tables.organisations {
            for role in tables.roles.iter().filter(|r| r.org_id == org.id) {
                let user_count = tables
                    .members
                    .iter()
                    .filter(|m| m.org_id == org.id && m.role_id == role.id)
                    .filter_map(|m| tables.users.iter().find(|u| u.id == m.user_id))
                    .filter(|u| in_range(u.audit.created_at, &range))
                    .count() as i64;

                if user_count > 0 {
                    counts.push(OrgRoleUserCount {
                        organisation_id: org.id,
                        organisation_name: org.name.clone(),
                        role_id: role.id,
                        role_name: role.name.clone(),
                        user_count,
                    });
                }
            }
        }

        Ok(counts)
    }
}

/// Unit of work over a private snapshot of the in-memory tables
pub struct MemoryUnitOfWork {
    shared: Arc<Shared>,
    working: Tables,
    journal: Vec<Mutation>,
    claimed: Vec<UniqueKey>,
}

impl MemoryUnitOfWork {
    fn record(&mut self, mutation: Mutation) -> StoreResult<()> {
        self.working.apply(&mutation)?;
        self.journal.push(mutation);
        Ok(())
    }

    /// Holds `key` for the rest of this unit of work
    ///
    /// Waits while another unit of work holds it.
    async fn claim(&mut self, key: UniqueKey) {
        if self.claimed.contains(&key) {
            return;
        }

        loop {
            let holder = {
                let mut claims = lock(&self.shared.claims);
                match claims.get(&key) {
                    Some(notify) => Arc::clone(notify),
                    None => {
                        claims.insert(key.clone(), Arc::new(Notify::new()));
                        break;
                    }
                }
            };

            let released = holder.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            let still_held = lock(&self.shared.claims)
                .get(&key)
                .is_some_and(|notify| Arc::ptr_eq(notify, &holder));
            if still_held {
                debug!(key = ?key, "Waiting for concurrent insert to finish");
                released.await;
            }
        }

        self.claimed.push(key);
    }

    fn committed(&self) -> MutexGuard<'_, Tables> {
        lock(&self.shared.tables)
    }
}

impl Drop for MemoryUnitOfWork {
    fn drop(&mut self) {
        if self.claimed.is_empty() {
            return;
        }

        let mut claims = lock(&self.shared.claims);
        for key in self.claimed.drain(..) {
            if let Some(notify) = claims.remove(&key) {
                notify.notify_waiters();
            }
        }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn find_user(&mut self, lookup: UserLookup<'_>) -> StoreResult<Option<User>> {
        Ok(self.working.user(&lookup).cloned())
    }

    async fn insert_user(&mut self, data: CreateUser) -> StoreResult<Option<User>> {
        if self.working.user(&UserLookup::ByEmail(&data.email)).is_some() {
            return Ok(None);
        }

        self.claim(UniqueKey::Email(data.email.clone())).await;
        let existing = self
            .committed()
            .user(&UserLookup::ByEmail(&data.email))
            .cloned();
        if let Some(existing) = existing {
            self.working.users.push(existing);
            return Ok(None);
        }

        let user = User {
            id: Uuid::new_v4(),
            email: data.email,
            password_hash: data.password_hash,
            profile: data.profile.unwrap_or_else(|| serde_json::json!({})),
            audit: Audit::new(),
        };
        self.record(Mutation::InsertUser(user.clone()))?;

        Ok(Some(user))
    }

    async fn update_user_password(
        &mut self,
        user_id: Uuid,
        password_hash: &str,
    ) -> StoreResult<bool> {
        if !self.working.users.iter().any(|u| u.id == user_id) {
            return Ok(false);
        }

        self.record(Mutation::SetPassword {
            user_id,
            password_hash: password_hash.to_string(),
        })?;

        Ok(true)
    }

    async fn find_organisation_by_name(&mut self, name: &str) -> StoreResult<Option<Organisation>> {
        Ok(self
            .working
            .organisations
            .iter()
            .find(|o| o.name == name)
            .cloned())
    }

    async fn insert_organisation(
        &mut self,
        data: CreateOrganisation,
    ) -> StoreResult<Option<Organisation>> {
        if self.working.organisations.iter().any(|o| o.name == data.name) {
            return Ok(None);
        }

        self.claim(UniqueKey::OrganisationName(data.name.clone())).await;
        let existing = self
            .committed()
            .organisations
            .iter()
            .find(|o| o.name == data.name)
            .cloned();
        if let Some(existing) = existing {
            self.working.organisations.push(existing);
            return Ok(None);
        }

        let organisation = Organisation {
            id: Uuid::new_v4(),
            name: data.name,
            personal: data.personal,
            audit: Audit::new(),
        };
        self.record(Mutation::InsertOrganisation(organisation.clone()))?;

        Ok(Some(organisation))
    }

    async fn find_role(&mut self, key: RoleKey<'_>) -> StoreResult<Option<Role>> {
        Ok(self.working.role(&key).cloned())
    }

    async fn find_role_by_id(&mut self, id: Uuid) -> StoreResult<Option<Role>> {
        Ok(self.working.roles.iter().find(|r| r.id == id).cloned())
    }

    async fn insert_role(&mut self, data: CreateRole) -> StoreResult<Option<Role>> {
        let key = RoleKey {
            name: &data.name,
            org_id: data.org_id,
        };
        if self.working.role(&key).is_some() {
            return Ok(None);
        }

        self.claim(UniqueKey::Role(data.name.clone(), data.org_id)).await;
        let existing = self.committed().role(&key).cloned();
        if let Some(existing) = existing {
            self.working.roles.push(existing);
            return Ok(None);
        }

        let role = Role {
            id: Uuid::new_v4(),
            name: data.name,
            description: data.description,
            org_id: data.org_id,
        };
        self.record(Mutation::InsertRole(role.clone()))?;

        Ok(Some(role))
    }

    async fn set_role_description(
        &mut self,
        role_id: Uuid,
        description: &str,
    ) -> StoreResult<Option<Role>> {
        if !self.working.roles.iter().any(|r| r.id == role_id) {
            return Ok(None);
        }

        self.record(Mutation::SetRoleDescription {
            role_id,
            description: description.to_string(),
        })?;

        self.find_role_by_id(role_id).await
    }

    async fn find_member(&mut self, key: MemberKey) -> StoreResult<Option<Member>> {
        Ok(self.working.member(&key).cloned())
    }

    async fn find_member_by_id(&mut self, id: Uuid) -> StoreResult<Option<Member>> {
        Ok(self.working.members.iter().find(|m| m.id == id).cloned())
    }

    async fn insert_member(&mut self, data: CreateMember) -> StoreResult<Option<Member>> {
        let key = MemberKey {
            org_id: data.org_id,
            user_id: data.user_id,
        };
        if self.working.member(&key).is_some() {
            return Ok(None);
        }

        self.claim(UniqueKey::Member(data.org_id, data.user_id)).await;
        let existing = self.committed().member(&key).cloned();
        if let Some(existing) = existing {
            self.working.members.push(existing);
            return Ok(None);
        }

        let member = Member {
            id: Uuid::new_v4(),
            org_id: data.org_id,
            user_id: data.user_id,
            role_id: data.role_id,
            audit: Audit::new(),
        };
        self.record(Mutation::InsertMember(member.clone()))?;

        Ok(Some(member))
    }

    async fn list_members(&mut self, org_id: Uuid) -> StoreResult<Vec<Member>> {
        Ok(self
            .working
            .members
            .iter()
            .filter(|m| m.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn update_member_role(
        &mut self,
        member_id: Uuid,
        role_id: Uuid,
    ) -> StoreResult<Option<Member>> {
        if !self.working.members.iter().any(|m| m.id == member_id) {
            return Ok(None);
        }

        self.record(Mutation::SetMemberRole { member_id, role_id })?;

        self.find_member_by_id(member_id).await
    }

    async fn delete_member(&mut self, member_id: Uuid) -> StoreResult<bool> {
        if !self.working.members.iter().any(|m| m.id == member_id) {
            return Ok(false);
        }

        self.record(Mutation::DeleteMember(member_id))?;

        Ok(true)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut shared = lock(&self.shared.tables);
        let mut next = shared.clone();

        for mutation in &self.journal {
            next.apply(mutation)?;
        }

        *shared = next;
        debug!(writes = self.journal.len(), "Committed in-memory unit of work");

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        debug!(writes = self.journal.len(), "Rolled back in-memory unit of work");
        Ok(())
    }
}
