//! Entity administration: create, look up, rename, enable/disable, self-service.
//!
//! Entities are created here; edges never are (they go through the reconciler).
//! Operations acting on behalf of someone take the actor explicitly as a
//! [`Principal`].

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use gatekeep_auth::{PasswordHasher, Principal};
use gatekeep_core::{
    DomainError, DomainResult, Email, EntityId, EntityKind, EntityName, ExpectedVersion, Group, GroupId, Named,
    Permission, PermissionId, Role, RoleId, User, UserId, check_password_policy,
};

use crate::gateway::password_failure;
use crate::store::{NamedRow, RbacStore, StoreError, StoreTx};

pub(crate) fn typed<I: EntityId>(row: NamedRow) -> Named<I> {
    Named {
        id: I::from_raw(row.id),
        name: row.name,
        version: row.version,
    }
}

/// Find a named entity by its case-insensitive name, inserting it if absent.
///
/// A concurrent creator winning the insert is not an error: the uniqueness
/// violation is absorbed and the winner's row is returned.
pub(crate) async fn get_or_create_in<I: EntityId>(tx: &mut dyn StoreTx, name: &EntityName) -> DomainResult<Named<I>> {
    if let Some(row) = tx.find_named_by_name(I::KIND, &name.key()).await? {
        return Ok(typed(row));
    }

    let row = NamedRow {
        id: Uuid::now_v7(),
        name: name.as_str().to_string(),
        version: 0,
    };
    match tx.insert_named(I::KIND, &row).await {
        Ok(()) => Ok(typed(row)),
        Err(StoreError::UniqueViolation(msg)) => {
            warn!(kind = %I::KIND, name = %name, error = %msg, "lost get-or-create race; re-fetching");
            tx.find_named_by_name(I::KIND, &name.key())
                .await?
                .map(typed)
                .ok_or_else(|| DomainError::conflict(format!("{} '{name}' vanished after a concurrent create", I::KIND)))
        }
        Err(other) => Err(other.into()),
    }
}

fn user_write_error(user_id: UserId, err: StoreError) -> DomainError {
    match err {
        StoreError::RowNotFound(_) => DomainError::not_found(EntityKind::User, [user_id]),
        StoreError::UniqueViolation(_) => DomainError::duplicate("email already in use"),
        other => other.into(),
    }
}

pub struct Directory<S> {
    store: S,
    hasher: Arc<dyn PasswordHasher>,
}

impl<S: RbacStore> Directory<S> {
    pub fn new(store: S, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { store, hasher }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Named entities
    // ─────────────────────────────────────────────────────────────────────────

    async fn create<I: EntityId>(&self, raw_name: &str) -> DomainResult<Named<I>> {
        let name = EntityName::parse(raw_name)?;
        let row = NamedRow {
            id: Uuid::now_v7(),
            name: name.into_inner(),
            version: 0,
        };

        let mut tx = self.store.begin().await?;
        match tx.insert_named(I::KIND, &row).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation(_)) => {
                return Err(DomainError::duplicate(format!(
                    "{} name '{}' already exists",
                    I::KIND,
                    row.name
                )));
            }
            Err(other) => return Err(other.into()),
        }
        tx.commit().await?;

        info!(kind = %I::KIND, id = %row.id, name = %row.name, "entity created");
        Ok(typed(row))
    }

    async fn get<I: EntityId>(&self, id: I) -> DomainResult<Named<I>> {
        let mut tx = self.store.begin().await?;
        tx.find_named(I::KIND, id.raw())
            .await?
            .map(typed)
            .ok_or_else(|| DomainError::not_found(I::KIND, [id]))
    }

    async fn list<I: EntityId>(&self) -> DomainResult<Vec<Named<I>>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_named(I::KIND).await?.into_iter().map(typed).collect())
    }

    pub async fn create_role(&self, name: &str) -> DomainResult<Role> {
        self.create(name).await
    }

    pub async fn create_group(&self, name: &str) -> DomainResult<Group> {
        self.create(name).await
    }

    pub async fn create_permission(&self, name: &str) -> DomainResult<Permission> {
        self.create(name).await
    }

    pub async fn get_or_create_role(&self, name: &str) -> DomainResult<Role> {
        let name = EntityName::parse(name)?;
        let mut tx = self.store.begin().await?;
        let role = get_or_create_in::<RoleId>(tx.as_mut(), &name).await?;
        tx.commit().await?;
        Ok(role)
    }

    pub async fn get_role(&self, id: RoleId) -> DomainResult<Role> {
        self.get(id).await
    }

    pub async fn list_roles(&self) -> DomainResult<Vec<Role>> {
        self.list::<RoleId>().await
    }

    pub async fn list_groups(&self) -> DomainResult<Vec<Group>> {
        self.list::<GroupId>().await
    }

    pub async fn list_permissions(&self) -> DomainResult<Vec<Permission>> {
        self.list::<PermissionId>().await
    }

    /// Rename a role, guarded by its optimistic version.
    pub async fn rename_role(&self, id: RoleId, new_name: &str, expected: ExpectedVersion) -> DomainResult<Role> {
        let name = EntityName::parse(new_name)?;
        let mut tx = self.store.begin().await?;
        let row = match tx.rename_named(EntityKind::Role, id.raw(), name.as_str(), expected).await {
            Ok(row) => row,
            Err(StoreError::RowNotFound(_)) => return Err(DomainError::not_found(EntityKind::Role, [id])),
            Err(StoreError::UniqueViolation(_)) => {
                return Err(DomainError::duplicate(format!("role name '{name}' already exists")));
            }
            Err(other) => return Err(other.into()),
        };
        tx.commit().await?;

        info!(role_id = %id, version = row.version, "role renamed");
        Ok(typed(row))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get_user(&self, id: UserId) -> DomainResult<User> {
        let mut tx = self.store.begin().await?;
        tx.find_user(id)
            .await?
            .ok_or_else(|| DomainError::not_found(EntityKind::User, [id]))
    }

    pub async fn list_users(&self) -> DomainResult<Vec<User>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_users().await?)
    }

    /// Enable or disable an account (administrative).
    pub async fn set_user_enabled(
        &self,
        actor: &Principal,
        user_id: UserId,
        enabled: bool,
        expected: ExpectedVersion,
    ) -> DomainResult<User> {
        let mut tx = self.store.begin().await?;
        let mut user = tx
            .find_user(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found(EntityKind::User, [user_id]))?;
        user.enabled = enabled;
        let updated = tx
            .update_user(&user, expected)
            .await
            .map_err(|e| user_write_error(user_id, e))?;
        tx.commit().await?;

        info!(actor = %actor.user_id, user_id = %user_id, enabled, "user enablement changed");
        Ok(updated)
    }

    /// Change the actor's own password after re-verifying the current one.
    pub async fn change_password(&self, actor: &Principal, current: &str, new_password: &str) -> DomainResult<User> {
        check_password_policy(new_password)?;

        let mut tx = self.store.begin().await?;
        let mut user = tx
            .find_user(actor.user_id)
            .await?
            .ok_or_else(|| DomainError::invalid_credentials("account no longer exists"))?;

        let matches = self
            .hasher
            .verify(current, &user.password_hash)
            .map_err(password_failure)?;
        if !matches {
            return Err(DomainError::invalid_credentials("current password is incorrect"));
        }

        user.password_hash = self.hasher.hash(new_password).map_err(password_failure)?;
        let expected = ExpectedVersion::Exact(user.version);
        let updated = tx
            .update_user(&user, expected)
            .await
            .map_err(|e| user_write_error(actor.user_id, e))?;
        tx.commit().await?;

        info!(user_id = %actor.user_id, "password changed");
        Ok(updated)
    }

    /// Change the actor's own email. Existing tokens carry the old email as
    /// subject and stop authenticating.
    pub async fn change_email(&self, actor: &Principal, new_email: &str) -> DomainResult<User> {
        let email = Email::parse(new_email)?;

        let mut tx = self.store.begin().await?;
        if let Some(owner) = tx.find_user_by_email(&email.key()).await? {
            if owner.id != actor.user_id {
                return Err(DomainError::duplicate("email already in use"));
            }
        }
        let mut user = tx
            .find_user(actor.user_id)
            .await?
            .ok_or_else(|| DomainError::invalid_credentials("account no longer exists"))?;

        user.email = email.into_inner();
        let expected = ExpectedVersion::Exact(user.version);
        let updated = tx
            .update_user(&user, expected)
            .await
            .map_err(|e| user_write_error(actor.user_id, e))?;
        tx.commit().await?;

        info!(user_id = %actor.user_id, "email changed");
        Ok(updated)
    }
}
