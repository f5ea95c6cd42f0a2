//! Cascade coordinator: delete entities together with every edge referencing them.
//!
//! Each delete call is one transaction:
//!
//! 1. Validate every ID exists (partial deletes are rejected wholesale)
//! 2. Remove every edge, in every edge set, that references one of the IDs
//! 3. Delete the base entities
//! 4. Translate a foreign-key violation from step 3 into `InvalidArgument`
//!    naming the blocking reference
//!
//! Edge cleanup is unconditional (no delta computation) and is visible to the
//! entity delete because both run in the same transaction.

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use gatekeep_core::{DomainError, DomainResult, EdgeKind, EntityId, GroupId, PermissionId, RoleId, UserId};

use crate::reconciler::ensure_exist;
use crate::store::{RbacStore, StoreError};

/// What a delete call removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub entities_deleted: u64,
    pub edges_removed: u64,
}

#[derive(Debug, Clone)]
pub struct CascadeCoordinator<S> {
    store: S,
}

impl<S: RbacStore> CascadeCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn delete_users(&self, ids: &[UserId]) -> DomainResult<CascadeReport> {
        self.delete(ids).await
    }

    pub async fn delete_roles(&self, ids: &[RoleId]) -> DomainResult<CascadeReport> {
        self.delete(ids).await
    }

    pub async fn delete_groups(&self, ids: &[GroupId]) -> DomainResult<CascadeReport> {
        self.delete(ids).await
    }

    pub async fn delete_permissions(&self, ids: &[PermissionId]) -> DomainResult<CascadeReport> {
        self.delete(ids).await
    }

    async fn delete<I: EntityId>(&self, ids: &[I]) -> DomainResult<CascadeReport> {
        let kind = I::KIND;
        if ids.is_empty() {
            return Err(DomainError::invalid_argument(format!("no {kind} ids given for deletion")));
        }

        let mut raw: Vec<Uuid> = ids.iter().map(EntityId::raw).collect();
        raw.sort();
        raw.dedup();

        let mut tx = self.store.begin().await?;
        ensure_exist(tx.as_mut(), kind, &raw).await?;

        let mut edges_removed = 0;
        for (edge, side) in EdgeKind::referencing(kind) {
            edges_removed += tx.delete_edges_touching(edge, side, &raw).await?;
        }

        let entities_deleted = match tx.delete_entities(kind, &raw).await {
            Ok(n) => n,
            Err(StoreError::ForeignKeyViolation(msg)) => {
                return Err(DomainError::invalid_argument(format!(
                    "cannot delete {kind}: still referenced ({msg})"
                )));
            }
            Err(other) => return Err(other.into()),
        };

        tx.commit().await?;

        let report = CascadeReport {
            entities_deleted,
            edges_removed,
        };
        info!(kind = %kind, entities_deleted, edges_removed, "cascade delete committed");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use gatekeep_core::{EntityKind, GroupRoleEdge, RolePermissionEdge, Side, UserGroupEdge, UserRoleEdge};

    use super::*;
    use crate::reconciler::EdgeReconciler;
    use crate::resolver::PermissionResolver;
    use crate::test_support::{named, store, user, RacingStore, Trigger};

    #[tokio::test]
    async fn deleting_a_role_removes_every_referencing_edge() {
        let store = store();
        let roles: Vec<RoleId> = named(&store, &["EDITOR", "MEMBER"]).await;
        let perms: Vec<PermissionId> = named(&store, &["docs.write"]).await;
        let groups: Vec<GroupId> = named(&store, &["writers"]).await;
        let only_editor = user(&store, "e@x.com", "h", true).await;
        let via_group = user(&store, "g@x.com", "h", true).await;

        EdgeReconciler::<UserRoleEdge, _>::new(store.clone())
            .assign(&[only_editor], &roles[..1])
            .await
            .unwrap();
        EdgeReconciler::<UserGroupEdge, _>::new(store.clone())
            .assign(&[via_group], &groups)
            .await
            .unwrap();
        EdgeReconciler::<GroupRoleEdge, _>::new(store.clone())
            .assign(&groups, &roles[..1])
            .await
            .unwrap();
        EdgeReconciler::<RolePermissionEdge, _>::new(store.clone())
            .assign(&roles[..1], &perms)
            .await
            .unwrap();

        let resolver = PermissionResolver::new(store.clone());
        assert!(resolver.resolve_permissions(only_editor).await.unwrap().contains("docs.write"));

        let report = CascadeCoordinator::new(store.clone())
            .delete_roles(&roles[..1])
            .await
            .unwrap();
        assert_eq!(
            report,
            CascadeReport {
                entities_deleted: 1,
                edges_removed: 3
            }
        );

        let mut tx = store.begin().await.unwrap();
        for (edge, side) in EdgeKind::referencing(EntityKind::Role) {
            assert!(tx.edges_touching(edge, side, &[roles[0].raw()]).await.unwrap().is_empty());
        }
        drop(tx);

        assert!(resolver.resolve_permissions(only_editor).await.unwrap().is_empty());
        assert!(resolver.resolve_permissions(via_group).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn partial_delete_is_rejected_wholesale() {
        let store = store();
        let groups: Vec<GroupId> = named(&store, &["staff"]).await;
        let ghost = GroupId::new();

        let err = CascadeCoordinator::new(store.clone())
            .delete_groups(&[groups[0], ghost])
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::not_found(EntityKind::Group, [ghost]));

        let mut tx = store.begin().await.unwrap();
        assert!(tx.missing_ids(EntityKind::Group, &[groups[0].raw()]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_a_user_keeps_roles_and_groups() {
        let store = store();
        let roles: Vec<RoleId> = named(&store, &["MEMBER"]).await;
        let groups: Vec<GroupId> = named(&store, &["staff"]).await;
        let u = user(&store, "m@x.com", "h", true).await;
        EdgeReconciler::<UserRoleEdge, _>::new(store.clone())
            .assign(&[u], &roles)
            .await
            .unwrap();
        EdgeReconciler::<UserGroupEdge, _>::new(store.clone())
            .assign(&[u], &groups)
            .await
            .unwrap();

        let report = CascadeCoordinator::new(store.clone()).delete_users(&[u, u]).await.unwrap();
        assert_eq!(report.entities_deleted, 1);
        assert_eq!(report.edges_removed, 2);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_user(u).await.unwrap().is_none());
        assert!(tx.missing_ids(EntityKind::Role, &[roles[0].raw()]).await.unwrap().is_empty());
        assert!(tx
            .edges_touching(EdgeKind::UserGroup, Side::Right, &[groups[0].raw()])
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn empty_delete_is_invalid() {
        let store = store();
        assert!(matches!(
            CascadeCoordinator::new(store).delete_permissions(&[]).await,
            Err(DomainError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn reference_added_after_edge_cleanup_blocks_the_delete() {
        let inner = store();
        let roles: Vec<RoleId> = named(&inner, &["EDITOR"]).await;
        let perms: Vec<PermissionId> = named(&inner, &["docs.write"]).await;
        let u = user(&inner, "e@x.com", "h", true).await;
        EdgeReconciler::<UserRoleEdge, _>::new(inner.clone())
            .assign(&[u], &roles)
            .await
            .unwrap();

        // Another writer links the role to a permission between edge cleanup and the entity delete.
        let racing = RacingStore::new(
            inner.clone(),
            Trigger::DeleteEntities,
            EdgeKind::RolePermission,
            vec![(roles[0].raw(), perms[0].raw())],
        );
        let err = CascadeCoordinator::new(racing).delete_roles(&roles).await.unwrap_err();
        match err {
            DomainError::InvalidArgument(msg) => assert!(msg.contains("still referenced"), "{msg}"),
            other => panic!("expected InvalidArgument, got {other:?}"),
        }

        let mut tx = inner.begin().await.unwrap();
        assert!(tx.missing_ids(EntityKind::Role, &[roles[0].raw()]).await.unwrap().is_empty());
        assert_eq!(
            tx.edges_touching(EdgeKind::UserRole, Side::Right, &[roles[0].raw()])
                .await
                .unwrap(),
            vec![(u.raw(), roles[0].raw())]
        );
    }
}
