//! Deterministic bootstrap data so the very first login is possible.
//!
//! Runs in one transaction and only when no user exists; re-running against a
//! populated store changes nothing. Edges are created through the reconciler.

use tracing::{debug, info};

use gatekeep_auth::PasswordHasher;
use gatekeep_core::{
    DomainResult, EntityName, GroupId, GroupRoleEdge, PermissionId, RoleId, RolePermissionEdge, User, UserGroupEdge,
    UserId, UserRoleEdge,
};

use crate::directory::get_or_create_in;
use crate::gateway::password_failure;
use crate::reconciler::assign_in;
use crate::store::RbacStore;

pub const ADMIN_EMAIL: &str = "admin@gatekeep.local";

pub const MEMBER_EMAILS: [&str; 3] = [
    "member1@gatekeep.local",
    "member2@gatekeep.local",
    "member3@gatekeep.local",
];

pub const ROLES: [&str; 3] = ["ADMIN", "MEMBER", "AUDITOR"];

pub const PERMISSIONS: [&str; 8] = [
    "users.read",
    "users.write",
    "roles.read",
    "roles.write",
    "groups.read",
    "groups.write",
    "permissions.read",
    "permissions.write",
];

pub const GROUPS: [&str; 2] = ["administrators", "staff"];

/// Seed the store if it holds no users. Returns whether anything was written.
pub async fn seed_if_empty<S: RbacStore>(store: &S, hasher: &dyn PasswordHasher, password: &str) -> DomainResult<bool> {
    let mut tx = store.begin().await?;
    if tx.count_users().await? > 0 {
        debug!("users present; skipping seed");
        return Ok(false);
    }

    let mut roles = Vec::with_capacity(ROLES.len());
    for name in ROLES {
        roles.push(get_or_create_in::<RoleId>(tx.as_mut(), &EntityName::parse(name)?).await?.id);
    }
    let [admin_role, member_role, auditor_role] = [roles[0], roles[1], roles[2]];

    let mut permissions = Vec::with_capacity(PERMISSIONS.len());
    for name in PERMISSIONS {
        permissions.push(
            get_or_create_in::<PermissionId>(tx.as_mut(), &EntityName::parse(name)?)
                .await?
                .id,
        );
    }
    let read_permissions: Vec<PermissionId> = PERMISSIONS
        .iter()
        .zip(&permissions)
        .filter(|(name, _)| name.ends_with(".read"))
        .map(|(_, id)| *id)
        .collect();
    let auditor_permissions = [permissions[0], permissions[2]];

    let mut groups = Vec::with_capacity(GROUPS.len());
    for name in GROUPS {
        groups.push(get_or_create_in::<GroupId>(tx.as_mut(), &EntityName::parse(name)?).await?.id);
    }
    let [administrators, staff] = [groups[0], groups[1]];

    let admin = User::new(ADMIN_EMAIL, hasher.hash(password).map_err(password_failure)?, true);
    tx.insert_user(&admin).await?;
    let mut members: Vec<UserId> = Vec::with_capacity(MEMBER_EMAILS.len());
    for email in MEMBER_EMAILS {
        let member = User::new(email, hasher.hash(password).map_err(password_failure)?, true);
        tx.insert_user(&member).await?;
        members.push(member.id);
    }

    let mut edges = 0;
    edges += assign_in::<RolePermissionEdge>(tx.as_mut(), &[admin_role], &permissions).await?;
    edges += assign_in::<RolePermissionEdge>(tx.as_mut(), &[member_role], &read_permissions).await?;
    edges += assign_in::<RolePermissionEdge>(tx.as_mut(), &[auditor_role], &auditor_permissions).await?;
    edges += assign_in::<GroupRoleEdge>(tx.as_mut(), &[administrators], &[admin_role]).await?;
    edges += assign_in::<GroupRoleEdge>(tx.as_mut(), &[staff], &[member_role]).await?;
    edges += assign_in::<UserRoleEdge>(tx.as_mut(), &[admin.id], &[admin_role, member_role]).await?;
    edges += assign_in::<UserRoleEdge>(tx.as_mut(), &members, &[member_role]).await?;
    edges += assign_in::<UserGroupEdge>(tx.as_mut(), &[admin.id], &[administrators]).await?;
    edges += assign_in::<UserGroupEdge>(tx.as_mut(), &members, &[staff]).await?;

    tx.commit().await?;

    info!(
        users = 1 + members.len(),
        roles = roles.len(),
        permissions = permissions.len(),
        groups = groups.len(),
        edges,
        "seed data written"
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use gatekeep_core::EntityKind;

    use super::*;
    use crate::resolver::PermissionResolver;
    use crate::test_support::{cheap_hasher, store};

    #[tokio::test]
    async fn seeds_once_then_is_a_noop() {
        let store = store();
        let hasher = cheap_hasher();

        assert!(seed_if_empty(&store, hasher.as_ref(), "changeme").await.unwrap());
        assert!(!seed_if_empty(&store, hasher.as_ref(), "changeme").await.unwrap());

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.count_users().await.unwrap(), 4);
        assert_eq!(tx.list_named(EntityKind::Role).await.unwrap().len(), 3);
        assert_eq!(tx.list_named(EntityKind::Permission).await.unwrap().len(), 8);
        assert_eq!(tx.list_named(EntityKind::Group).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn seeded_users_resolve_the_expected_access() {
        let store = store();
        seed_if_empty(&store, cheap_hasher().as_ref(), "changeme").await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let admin = tx.find_user_by_email(ADMIN_EMAIL).await.unwrap().unwrap();
        let member = tx.find_user_by_email(MEMBER_EMAILS[0]).await.unwrap().unwrap();
        drop(tx);

        let resolver = PermissionResolver::new(store.clone());
        assert_eq!(resolver.resolve_permissions(admin.id).await.unwrap().len(), 8);
        assert_eq!(
            resolver.resolve_role_names(admin.id).await.unwrap(),
            vec!["ADMIN".to_string(), "MEMBER".to_string()]
        );

        let member_permissions = resolver.resolve_permissions(member.id).await.unwrap();
        assert_eq!(member_permissions.len(), 4);
        assert!(member_permissions.iter().all(|p| p.ends_with(".read")));
    }
}
