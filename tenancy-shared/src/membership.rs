/// Organisation, role and member operations
///
/// Every function runs inside the caller's [`UnitOfWork`], so a workflow can
/// combine several of them and commit or discard the lot.
///
/// # Get-or-create
///
/// Organisations and roles are created on first use. Lookup and insert are
/// two separate statements, so two concurrent callers can both miss on the
/// lookup. The insert is insert-if-absent against the unique index; the
/// loser gets no row back and re-reads the winner's row.
///
/// # Example
///
/// ```no_run
/// use tenancy_shared::membership;
/// use tenancy_shared::store::{memory::MemoryStore, Store};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::new();
/// let mut uow = store.begin().await?;
///
/// let org = membership::get_or_create_organisation(uow.as_mut(), "Acme", false).await?;
/// let role = membership::get_or_create_role(uow.as_mut(), "owner", org.id, None).await?;
///
/// uow.commit().await?;
/// # Ok(())
/// # }
/// ```

use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    CreateMember, CreateOrganisation, CreateRole, Member, MemberKey, Organisation, Role, RoleKey,
};
use crate::store::{StoreError, StoreResult, UnitOfWork};

/// Finds an organisation by name, creating it if absent
///
/// `personal` only applies when the organisation is created here.
pub async fn get_or_create_organisation(
    uow: &mut dyn UnitOfWork,
    name: &str,
    personal: bool,
) -> StoreResult<Organisation> {
    if let Some(existing) = uow.find_organisation_by_name(name).await? {
        return Ok(existing);
    }

    let data = CreateOrganisation {
        name: name.to_string(),
        personal,
    };

    match uow.insert_organisation(data).await? {
        Some(created) => {
            info!(org_id = %created.id, name = %created.name, "Organisation created");
            Ok(created)
        }
        None => {
            debug!(name = %name, "Organisation created concurrently, re-reading");
            uow.find_organisation_by_name(name)
                .await?
                .ok_or_else(|| StoreError::Conflict(format!("organisation '{}' vanished", name)))
        }
    }
}

/// Finds a role by `(name, org_id)`, creating it if absent
///
/// A supplied non-empty description is written when the role has none yet;
/// an existing description is never overwritten.
pub async fn get_or_create_role(
    uow: &mut dyn UnitOfWork,
    name: &str,
    org_id: Uuid,
    description: Option<&str>,
) -> StoreResult<Role> {
    let key = RoleKey { name, org_id };

    let role = match uow.find_role(key).await? {
        Some(existing) => existing,
        None => {
            let data = CreateRole {
                name: name.to_string(),
                org_id,
                description: None,
            };

            match uow.insert_role(data).await? {
                Some(created) => {
                    info!(role_id = %created.id, org_id = %org_id, name = %name, "Role created");
                    created
                }
                None => {
                    debug!(org_id = %org_id, name = %name, "Role created concurrently, re-reading");
                    uow.find_role(key).await?.ok_or_else(|| {
                        StoreError::Conflict(format!("role '{}' in {} vanished", name, org_id))
                    })?
                }
            }
        }
    };

    match description {
        Some(text) if role.needs_description(Some(text)) => {
            let updated = uow
                .set_role_description(role.id, text)
                .await?
                .ok_or_else(|| StoreError::Conflict(format!("role {} vanished", role.id)))?;
            debug!(role_id = %updated.id, "Role description backfilled");
            Ok(updated)
        }
        _ => Ok(role),
    }
}

/// Binds a user to an organisation with a role
///
/// At most one member exists per `(org_id, user_id)`. If one already exists
/// it is returned unchanged, whatever its role.
pub async fn create_member(
    uow: &mut dyn UnitOfWork,
    user_id: Uuid,
    org_id: Uuid,
    role_id: Uuid,
) -> StoreResult<Member> {
    let data = CreateMember {
        user_id,
        org_id,
        role_id,
    };

    if let Some(created) = uow.insert_member(data).await? {
        info!(
            member_id = %created.id,
            user_id = %user_id,
            org_id = %org_id,
            role_id = %role_id,
            "Member created"
        );
        return Ok(created);
    }

    debug!(user_id = %user_id, org_id = %org_id, "Member already exists");
    find_member_by_user_and_org(uow, org_id, user_id)
        .await?
        .ok_or_else(|| StoreError::Conflict(format!("member {}/{} vanished", org_id, user_id)))
}

pub async fn find_member_by_user_and_org(
    uow: &mut dyn UnitOfWork,
    org_id: Uuid,
    user_id: Uuid,
) -> StoreResult<Option<Member>> {
    uow.find_member(MemberKey { org_id, user_id }).await
}

/// Deletes a member; `false` if it did not exist
pub async fn remove_member(uow: &mut dyn UnitOfWork, member_id: Uuid) -> StoreResult<bool> {
    let removed = uow.delete_member(member_id).await?;
    if removed {
        info!(member_id = %member_id, "Member removed");
    }
    Ok(removed)
}

/// Points a member at another role; `None` if the member does not exist
pub async fn update_member_role(
    uow: &mut dyn UnitOfWork,
    member_id: Uuid,
    role_id: Uuid,
) -> StoreResult<Option<Member>> {
    let updated = uow.update_member_role(member_id, role_id).await?;
    if let Some(member) = &updated {
        info!(member_id = %member.id, role_id = %role_id, "Member role updated");
    }
    Ok(updated)
}

pub async fn find_role(uow: &mut dyn UnitOfWork, role_id: Uuid) -> StoreResult<Option<Role>> {
    uow.find_role_by_id(role_id).await
}

pub async fn list_members_of_org(
    uow: &mut dyn UnitOfWork,
    org_id: Uuid,
) -> StoreResult<Vec<Member>> {
    uow.list_members(org_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateUser;
    use crate::store::{memory::MemoryStore, Store};

    async fn seed_user(uow: &mut dyn UnitOfWork, email: &str) -> Uuid {
        uow.insert_user(CreateUser {
            email: email.to_string(),
            password_hash: "$argon2id$stub".to_string(),
            profile: None,
        })
        .await
        .unwrap()
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn test_get_or_create_organisation_is_idempotent() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();

        let first = get_or_create_organisation(uow.as_mut(), "Acme", false).await.unwrap();
        let second = get_or_create_organisation(uow.as_mut(), "Acme", true).await.unwrap();

        assert_eq!(first.id, second.id);
        // personal flag is fixed at creation
        assert!(!second.personal);
    }

    #[tokio::test]
    async fn test_get_or_create_organisation_across_units_of_work() {
        let store = MemoryStore::new();

        let mut uow = store.begin().await.unwrap();
        let first = get_or_create_organisation(uow.as_mut(), "Acme", false).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let second = get_or_create_organisation(uow.as_mut(), "Acme", false).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_get_or_create_role_is_idempotent() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let org = get_or_create_organisation(uow.as_mut(), "Acme", false).await.unwrap();

        let first = get_or_create_role(uow.as_mut(), "owner", org.id, None).await.unwrap();
        let second = get_or_create_role(uow.as_mut(), "owner", org.id, None).await.unwrap();

        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_roles_are_scoped_per_organisation() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let acme = get_or_create_organisation(uow.as_mut(), "Acme", false).await.unwrap();
        let globex = get_or_create_organisation(uow.as_mut(), "Globex", false).await.unwrap();

        let a = get_or_create_role(uow.as_mut(), "owner", acme.id, None).await.unwrap();
        let g = get_or_create_role(uow.as_mut(), "owner", globex.id, None).await.unwrap();

        assert_ne!(a.id, g.id);
    }

    #[tokio::test]
    async fn test_role_description_backfilled_once() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let org = get_or_create_organisation(uow.as_mut(), "Acme", false).await.unwrap();

        let bare = get_or_create_role(uow.as_mut(), "owner", org.id, None).await.unwrap();
        assert!(bare.description.is_none());

        let filled = get_or_create_role(uow.as_mut(), "owner", org.id, Some("Full control"))
            .await
            .unwrap();
        assert_eq!(filled.id, bare.id);
        assert_eq!(filled.description.as_deref(), Some("Full control"));

        let kept = get_or_create_role(uow.as_mut(), "owner", org.id, Some("Other"))
            .await
            .unwrap();
        assert_eq!(kept.description.as_deref(), Some("Full control"));
    }

    #[tokio::test]
    async fn test_create_member_returns_existing_on_duplicate() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let user_id = seed_user(uow.as_mut(), "a@x.com").await;
        let org = get_or_create_organisation(uow.as_mut(), "Acme", false).await.unwrap();
        let owner = get_or_create_role(uow.as_mut(), "owner", org.id, None).await.unwrap();
        let admin = get_or_create_role(uow.as_mut(), "admin", org.id, None).await.unwrap();

        let first = create_member(uow.as_mut(), user_id, org.id, owner.id).await.unwrap();
        let again = create_member(uow.as_mut(), user_id, org.id, admin.id).await.unwrap();

        assert_eq!(first.id, again.id);
        assert_eq!(again.role_id, owner.id);
        assert_eq!(list_members_of_org(uow.as_mut(), org.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_remove_member() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let user_id = seed_user(uow.as_mut(), "a@x.com").await;
        let org = get_or_create_organisation(uow.as_mut(), "Acme", false).await.unwrap();
        let owner = get_or_create_role(uow.as_mut(), "owner", org.id, None).await.unwrap();
        let admin = get_or_create_role(uow.as_mut(), "admin", org.id, None).await.unwrap();
        let member = create_member(uow.as_mut(), user_id, org.id, owner.id).await.unwrap();

        let updated = update_member_role(uow.as_mut(), member.id, admin.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.role_id, admin.id);

        let found = find_member_by_user_and_org(uow.as_mut(), org.id, user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.role_id, admin.id);
        assert_eq!(
            find_role(uow.as_mut(), found.role_id).await.unwrap().map(|r| r.name),
            Some("admin".to_string())
        );

        assert!(remove_member(uow.as_mut(), member.id).await.unwrap());
        assert!(!remove_member(uow.as_mut(), member.id).await.unwrap());
        assert!(find_member_by_user_and_org(uow.as_mut(), org.id, user_id)
            .await
            .unwrap()
            .is_none());
    }
}
