//! Effective-permission resolution.
//!
//! ```text
//! user ──UserRole──────────────────┐
//!   └──UserGroup── group ──GroupRole─┴→ roles ──RolePermission→ permissions
//! ```
//!
//! Read-only and uncached: every call opens a fresh transaction and sees the
//! latest committed edges, so revoked roles take effect on the next request.

use std::collections::BTreeSet;

use uuid::Uuid;

use gatekeep_core::{DomainError, DomainResult, EdgeKind, EntityKind, Side, UserId};

use crate::store::{RbacStore, StoreTx};

async fn rights_of(tx: &mut dyn StoreTx, kind: EdgeKind, lefts: &[Uuid]) -> DomainResult<Vec<Uuid>> {
    if lefts.is_empty() {
        return Ok(Vec::new());
    }
    let pairs = tx.edges_touching(kind, Side::Left, lefts).await?;
    let unique: BTreeSet<Uuid> = pairs.into_iter().map(|(_, right)| right).collect();
    Ok(unique.into_iter().collect())
}

async fn ensure_user(tx: &mut dyn StoreTx, user_id: UserId) -> DomainResult<()> {
    if tx.find_user(user_id).await?.is_none() {
        return Err(DomainError::not_found(EntityKind::User, [user_id]));
    }
    Ok(())
}

/// Role IDs assigned to the user directly.
pub(crate) async fn direct_role_ids_in(tx: &mut dyn StoreTx, user_id: UserId) -> DomainResult<Vec<Uuid>> {
    rights_of(tx, EdgeKind::UserRole, &[*user_id.as_uuid()]).await
}

/// Role names assigned to the user directly, sorted.
pub(crate) async fn role_names_in(tx: &mut dyn StoreTx, user_id: UserId) -> DomainResult<Vec<String>> {
    let role_ids = direct_role_ids_in(tx, user_id).await?;
    if role_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut names = tx.names_of(EntityKind::Role, &role_ids).await?;
    names.sort();
    Ok(names)
}

/// Permission names reachable through direct and group-inherited roles.
pub(crate) async fn permissions_in(tx: &mut dyn StoreTx, user_id: UserId) -> DomainResult<BTreeSet<String>> {
    let mut role_ids: BTreeSet<Uuid> = direct_role_ids_in(tx, user_id).await?.into_iter().collect();

    let group_ids = rights_of(tx, EdgeKind::UserGroup, &[*user_id.as_uuid()]).await?;
    role_ids.extend(rights_of(tx, EdgeKind::GroupRole, &group_ids).await?);

    let role_ids: Vec<Uuid> = role_ids.into_iter().collect();
    let permission_ids = rights_of(tx, EdgeKind::RolePermission, &role_ids).await?;
    if permission_ids.is_empty() {
        return Ok(BTreeSet::new());
    }
    Ok(tx
        .names_of(EntityKind::Permission, &permission_ids)
        .await?
        .into_iter()
        .collect())
}

/// Resolves what a user may do from the live edge state.
#[derive(Debug, Clone)]
pub struct PermissionResolver<S> {
    store: S,
}

impl<S: RbacStore> PermissionResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Every permission name reachable from the user, deduplicated.
    pub async fn resolve_permissions(&self, user_id: UserId) -> DomainResult<BTreeSet<String>> {
        let mut tx = self.store.begin().await?;
        ensure_user(tx.as_mut(), user_id).await?;
        let permissions = permissions_in(tx.as_mut(), user_id).await?;
        tx.rollback().await?;
        Ok(permissions)
    }

    /// Names of the roles assigned to the user directly (not through groups).
    pub async fn resolve_role_names(&self, user_id: UserId) -> DomainResult<Vec<String>> {
        let mut tx = self.store.begin().await?;
        ensure_user(tx.as_mut(), user_id).await?;
        let names = role_names_in(tx.as_mut(), user_id).await?;
        tx.rollback().await?;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use gatekeep_core::{GroupId, GroupRoleEdge, PermissionId, RoleId, RolePermissionEdge, UserGroupEdge, UserRoleEdge};

    use super::*;
    use crate::reconciler::EdgeReconciler;
    use crate::test_support::{named, store, user};

    #[tokio::test]
    async fn group_inherited_roles_grant_permissions() {
        let store = store();
        let roles: Vec<RoleId> = named(&store, &["REPORTER"]).await;
        let perms: Vec<PermissionId> = named(&store, &["reports.read"]).await;
        let groups: Vec<GroupId> = named(&store, &["analysts"]).await;
        let u = user(&store, "a@x.com", "h", true).await;

        EdgeReconciler::<UserGroupEdge, _>::new(store.clone())
            .assign(&[u], &groups)
            .await
            .unwrap();
        EdgeReconciler::<GroupRoleEdge, _>::new(store.clone())
            .assign(&groups, &roles)
            .await
            .unwrap();
        EdgeReconciler::<RolePermissionEdge, _>::new(store.clone())
            .assign(&roles, &perms)
            .await
            .unwrap();

        let resolver = PermissionResolver::new(store.clone());
        assert_eq!(
            resolver.resolve_permissions(u).await.unwrap(),
            BTreeSet::from(["reports.read".to_string()])
        );
        // Role names stop at direct assignments.
        assert!(resolver.resolve_role_names(u).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn direct_and_inherited_paths_are_deduplicated() {
        let store = store();
        let roles: Vec<RoleId> = named(&store, &["MEMBER", "AUDITOR"]).await;
        let perms: Vec<PermissionId> = named(&store, &["users.read", "roles.read"]).await;
        let groups: Vec<GroupId> = named(&store, &["staff"]).await;
        let u = user(&store, "a@x.com", "h", true).await;

        EdgeReconciler::<UserRoleEdge, _>::new(store.clone())
            .assign(&[u], &roles)
            .await
            .unwrap();
        EdgeReconciler::<UserGroupEdge, _>::new(store.clone())
            .assign(&[u], &groups)
            .await
            .unwrap();
        EdgeReconciler::<GroupRoleEdge, _>::new(store.clone())
            .assign(&groups, &roles[..1])
            .await
            .unwrap();
        EdgeReconciler::<RolePermissionEdge, _>::new(store.clone())
            .assign(&roles, &perms)
            .await
            .unwrap();

        let resolver = PermissionResolver::new(store.clone());
        let permissions = resolver.resolve_permissions(u).await.unwrap();
        assert_eq!(permissions.len(), 2);
        assert_eq!(
            resolver.resolve_role_names(u).await.unwrap(),
            vec!["AUDITOR".to_string(), "MEMBER".to_string()]
        );
    }

    #[tokio::test]
    async fn revocation_is_visible_on_the_next_call() {
        let store = store();
        let roles: Vec<RoleId> = named(&store, &["MEMBER"]).await;
        let perms: Vec<PermissionId> = named(&store, &["users.read"]).await;
        let u = user(&store, "a@x.com", "h", true).await;
        let user_roles = EdgeReconciler::<UserRoleEdge, _>::new(store.clone());
        user_roles.assign(&[u], &roles).await.unwrap();
        EdgeReconciler::<RolePermissionEdge, _>::new(store.clone())
            .assign(&roles, &perms)
            .await
            .unwrap();

        let resolver = PermissionResolver::new(store.clone());
        assert_eq!(resolver.resolve_permissions(u).await.unwrap().len(), 1);

        user_roles.deassign(&[u], &roles).await.unwrap();
        assert!(resolver.resolve_permissions(u).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let resolver = PermissionResolver::new(store());
        assert!(matches!(
            resolver.resolve_permissions(UserId::new()).await,
            Err(DomainError::NotFound { kind: EntityKind::User, .. })
        ));
    }
}
