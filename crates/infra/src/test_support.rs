//! Fixtures shared by the unit tests of this crate.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use gatekeep_auth::Argon2PasswordHasher;
use gatekeep_core::{EdgeKind, EntityId, EntityKind, ExpectedVersion, Side, User, UserId};

use crate::store::{InMemoryStore, NamedRow, RbacStore, StoreResult, StoreTx};

pub(crate) fn store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new())
}

/// Argon2 with minimal cost so tests stay fast.
pub(crate) fn cheap_hasher() -> Arc<Argon2PasswordHasher> {
    Arc::new(Argon2PasswordHasher::with_params(1024, 1, 1).unwrap())
}

/// Insert one named entity per name and return their typed IDs.
pub(crate) async fn named<I: EntityId>(store: &impl RbacStore, names: &[&str]) -> Vec<I> {
    let mut tx = store.begin().await.unwrap();
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        let row = NamedRow {
            id: Uuid::now_v7(),
            name: name.to_string(),
            version: 0,
        };
        tx.insert_named(I::KIND, &row).await.unwrap();
        ids.push(I::from_raw(row.id));
    }
    tx.commit().await.unwrap();
    ids
}

pub(crate) async fn user(store: &impl RbacStore, email: &str, password_hash: &str, enabled: bool) -> UserId {
    let user = User::new(email, password_hash, enabled);
    let mut tx = store.begin().await.unwrap();
    tx.insert_user(&user).await.unwrap();
    tx.commit().await.unwrap();
    user.id
}

/// Call of the wrapped transaction that lets the competing write in first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    InsertEdges,
    DeleteEntities,
}

type Competitor = Arc<Mutex<Option<(EdgeKind, Vec<(Uuid, Uuid)>)>>>;

/// Store wrapper that commits a competing edge insert from another transaction
/// just before the first [`Trigger`] call, reproducing a read-then-write race
/// window deterministically.
pub(crate) struct RacingStore {
    inner: Arc<InMemoryStore>,
    trigger: Trigger,
    competitor: Competitor,
}

impl RacingStore {
    pub(crate) fn new(inner: Arc<InMemoryStore>, trigger: Trigger, kind: EdgeKind, pairs: Vec<(Uuid, Uuid)>) -> Self {
        Self {
            inner,
            trigger,
            competitor: Arc::new(Mutex::new(Some((kind, pairs)))),
        }
    }
}

struct RacingTx {
    inner: Box<dyn StoreTx>,
    store: Arc<InMemoryStore>,
    trigger: Trigger,
    competitor: Competitor,
}

impl RacingTx {
    async fn compete(&mut self, at: Trigger) -> StoreResult<()> {
        if at != self.trigger {
            return Ok(());
        }
        let competing = self.competitor.lock().unwrap().take();
        if let Some((kind, pairs)) = competing {
            let mut other = self.store.begin().await?;
            other.insert_edges(kind, &pairs).await?;
            other.commit().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RbacStore for RacingStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        Ok(Box::new(RacingTx {
            inner: self.inner.begin().await?,
            store: self.inner.clone(),
            trigger: self.trigger,
            competitor: self.competitor.clone(),
        }))
    }
}

#[async_trait]
impl StoreTx for RacingTx {
    async fn missing_ids(&mut self, kind: EntityKind, ids: &[Uuid]) -> StoreResult<Vec<Uuid>> {
        self.inner.missing_ids(kind, ids).await
    }
    async fn count_users(&mut self) -> StoreResult<u64> {
        self.inner.count_users().await
    }
    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        self.inner.insert_user(user).await
    }
    async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        self.inner.find_user(id).await
    }
    async fn find_user_by_email(&mut self, email_key: &str) -> StoreResult<Option<User>> {
        self.inner.find_user_by_email(email_key).await
    }
    async fn list_users(&mut self) -> StoreResult<Vec<User>> {
        self.inner.list_users().await
    }
    async fn update_user(&mut self, user: &User, expected: ExpectedVersion) -> StoreResult<User> {
        self.inner.update_user(user, expected).await
    }
    async fn insert_named(&mut self, kind: EntityKind, row: &NamedRow) -> StoreResult<()> {
        self.inner.insert_named(kind, row).await
    }
    async fn find_named(&mut self, kind: EntityKind, id: Uuid) -> StoreResult<Option<NamedRow>> {
        self.inner.find_named(kind, id).await
    }
    async fn find_named_by_name(&mut self, kind: EntityKind, name_key: &str) -> StoreResult<Option<NamedRow>> {
        self.inner.find_named_by_name(kind, name_key).await
    }
    async fn list_named(&mut self, kind: EntityKind) -> StoreResult<Vec<NamedRow>> {
        self.inner.list_named(kind).await
    }
    async fn names_of(&mut self, kind: EntityKind, ids: &[Uuid]) -> StoreResult<Vec<String>> {
        self.inner.names_of(kind, ids).await
    }
    async fn rename_named(
        &mut self,
        kind: EntityKind,
        id: Uuid,
        name: &str,
        expected: ExpectedVersion,
    ) -> StoreResult<NamedRow> {
        self.inner.rename_named(kind, id, name, expected).await
    }
    async fn delete_entities(&mut self, kind: EntityKind, ids: &[Uuid]) -> StoreResult<u64> {
        self.compete(Trigger::DeleteEntities).await?;
        self.inner.delete_entities(kind, ids).await
    }
    async fn edges_within(&mut self, kind: EdgeKind, lefts: &[Uuid], rights: &[Uuid]) -> StoreResult<Vec<(Uuid, Uuid)>> {
        self.inner.edges_within(kind, lefts, rights).await
    }
    async fn edges_touching(&mut self, kind: EdgeKind, side: Side, ids: &[Uuid]) -> StoreResult<Vec<(Uuid, Uuid)>> {
        self.inner.edges_touching(kind, side, ids).await
    }
    async fn insert_edges(&mut self, kind: EdgeKind, pairs: &[(Uuid, Uuid)]) -> StoreResult<u64> {
        self.compete(Trigger::InsertEdges).await?;
        self.inner.insert_edges(kind, pairs).await
    }
    async fn delete_edges_within(&mut self, kind: EdgeKind, lefts: &[Uuid], rights: &[Uuid]) -> StoreResult<u64> {
        self.inner.delete_edges_within(kind, lefts, rights).await
    }
    async fn delete_edges_touching(&mut self, kind: EdgeKind, side: Side, ids: &[Uuid]) -> StoreResult<u64> {
        self.inner.delete_edges_touching(kind, side, ids).await
    }
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.inner.commit().await
    }
    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback().await
    }
}
