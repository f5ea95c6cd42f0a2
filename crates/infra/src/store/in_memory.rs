//! In-memory transactional store.
//!
//! Intended for tests/dev. Not optimized for performance.
//!
//! Every row keeps its committed image plus at most one pending image staged by
//! an open transaction (`None` for a pending delete). Other transactions keep
//! reading the committed image until the owner commits or rolls back, so
//! uncommitted inserts, updates and deletes are all invisible to them.
//!
//! A write that touches a row held by another transaction waits for that
//! transaction to finish, then re-checks its constraints. Waiting transactions
//! are tracked in a waits-for graph; a wait that would close a cycle fails
//! with [`StoreError::Deadlock`] instead of blocking.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

use gatekeep_core::{EdgeKind, EntityKind, ExpectedVersion, Side, User, UserId};

use super::r#trait::{NamedRow, RbacStore, StoreError, StoreResult, StoreTx};

type TxId = u64;
type Pair = (Uuid, Uuid);

#[derive(Debug, Clone)]
struct Row<T> {
    committed: Option<T>,
    /// Image staged by an open transaction: `Some` for an insert or update,
    /// `None` for a delete.
    pending: Option<(TxId, Option<T>)>,
}

impl<T> Row<T> {
    fn vacant() -> Self {
        Self {
            committed: None,
            pending: None,
        }
    }

    /// The image `me` reads.
    fn view(&self, me: TxId) -> Option<&T> {
        match &self.pending {
            Some((owner, image)) if *owner == me => image.as_ref(),
            _ => self.committed.as_ref(),
        }
    }

    /// Another transaction holding this row, if any.
    fn holder(&self, me: TxId) -> Option<TxId> {
        match self.pending {
            Some((owner, _)) if owner != me => Some(owner),
            _ => None,
        }
    }

    /// True while another transaction has a delete of a committed row pending.
    fn deleting_by_other(&self, me: TxId) -> bool {
        self.committed.is_some() && matches!(&self.pending, Some((owner, None)) if *owner != me)
    }

    /// Every value this row could settle to.
    fn images(&self) -> impl Iterator<Item = &T> {
        self.committed
            .iter()
            .chain(self.pending.iter().filter_map(|(_, image)| image.as_ref()))
    }

    fn stage(&mut self, me: TxId, image: Option<T>) {
        self.pending = Some((me, image));
    }

    fn settle(&mut self, me: TxId, commit: bool) {
        match self.pending.take() {
            Some((owner, image)) if owner == me => {
                if commit {
                    self.committed = image;
                }
            }
            other => self.pending = other,
        }
    }

    fn is_vacant(&self) -> bool {
        self.committed.is_none() && self.pending.is_none()
    }
}

/// A row staged by a transaction, settled when it finishes.
#[derive(Debug, Clone, Copy)]
enum Key {
    User(Uuid),
    Named(EntityKind, Uuid),
    Edge(EdgeKind, Pair),
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, Row<User>>,
    named: HashMap<EntityKind, HashMap<Uuid, Row<NamedRow>>>,
    edges: HashMap<EdgeKind, HashMap<Pair, Row<()>>>,
    /// Blocked transaction -> the transaction it waits for.
    waits_for: HashMap<TxId, TxId>,
}

/// Outcome of checking a write against uniqueness constraints.
enum Probe {
    Clear,
    Duplicate(String),
    Blocked(TxId),
}

/// Outcome of one write attempt under the table lock.
enum Step<T> {
    Done(T),
    Blocked(TxId),
}

/// What a transaction can see of an entity row.
#[derive(Debug, Default)]
struct Peek {
    visible: bool,
    holder: Option<TxId>,
    deleting: bool,
}

impl Peek {
    fn of<T>(row: Option<&Row<T>>, me: TxId) -> Self {
        match row {
            None => Self::default(),
            Some(row) => Self {
                visible: row.view(me).is_some(),
                holder: row.holder(me),
                deleting: row.deleting_by_other(me),
            },
        }
    }
}

fn contains(ids: &[Uuid], id: &Uuid) -> bool {
    ids.contains(id)
}

fn touches(pair: &Pair, side: Side, ids: &[Uuid]) -> bool {
    match side {
        Side::Left => contains(ids, &pair.0),
        Side::Right => contains(ids, &pair.1),
    }
}

fn settle_in<K: Eq + Hash, T>(table: &mut HashMap<K, Row<T>>, key: K, me: TxId, commit: bool) {
    if let Some(row) = table.get_mut(&key) {
        row.settle(me, commit);
        if row.is_vacant() {
            table.remove(&key);
        }
    }
}

impl Tables {
    fn named_mut(&mut self, kind: EntityKind) -> &mut HashMap<Uuid, Row<NamedRow>> {
        self.named.entry(kind).or_default()
    }

    fn edges_mut(&mut self, kind: EdgeKind) -> &mut HashMap<Pair, Row<()>> {
        self.edges.entry(kind).or_default()
    }

    fn peek_entity(&self, kind: EntityKind, id: Uuid, me: TxId) -> Peek {
        match kind {
            EntityKind::User => Peek::of(self.users.get(&id), me),
            _ => Peek::of(self.named.get(&kind).and_then(|t| t.get(&id)), me),
        }
    }

    fn entity_visible(&self, kind: EntityKind, id: Uuid, me: TxId) -> bool {
        self.peek_entity(kind, id, me).visible
    }

    fn visible_edges(&self, kind: EdgeKind, me: TxId) -> impl Iterator<Item = Pair> + '_ {
        self.edges
            .get(&kind)
            .into_iter()
            .flat_map(|t| t.iter())
            .filter(move |(_, row)| row.view(me).is_some())
            .map(|(pair, _)| *pair)
    }

    fn probe_user_email(&self, email_key: &str, except: Uuid, me: TxId) -> Probe {
        let mut probe = Probe::Clear;
        for (id, row) in &self.users {
            if *id == except {
                continue;
            }
            let clashes = |u: &User| u.email.to_lowercase() == email_key;
            match row.holder(me) {
                Some(holder) if row.images().any(clashes) => probe = Probe::Blocked(holder),
                Some(_) => {}
                None => {
                    if let Some(user) = row.view(me).filter(|u| clashes(*u)) {
                        return Probe::Duplicate(format!("email '{}' already exists", user.email));
                    }
                }
            }
        }
        probe
    }

    fn probe_name(&self, kind: EntityKind, name_key: &str, except: Uuid, me: TxId) -> Probe {
        let mut probe = Probe::Clear;
        let Some(table) = self.named.get(&kind) else {
            return probe;
        };
        for (id, row) in table {
            if *id == except {
                continue;
            }
            let clashes = |r: &NamedRow| r.name.to_lowercase() == name_key;
            match row.holder(me) {
                Some(holder) if row.images().any(clashes) => probe = Probe::Blocked(holder),
                Some(_) => {}
                None => {
                    if let Some(existing) = row.view(me).filter(|r| clashes(*r)) {
                        return Probe::Duplicate(format!("{kind} name '{}' already exists", existing.name));
                    }
                }
            }
        }
        probe
    }

    fn probe_edges(&self, kind: EdgeKind, pairs: &[Pair], me: TxId) -> Probe {
        let mut seen = HashSet::with_capacity(pairs.len());
        if let Some(pair) = pairs.iter().find(|p| !seen.insert(**p)) {
            return Probe::Duplicate(format!("{kind} edge ({}, {}) listed twice", pair.0, pair.1));
        }
        let Some(table) = self.edges.get(&kind) else {
            return Probe::Clear;
        };
        let mut probe = Probe::Clear;
        for pair in pairs {
            let Some(row) = table.get(pair) else {
                continue;
            };
            if let Some(holder) = row.holder(me) {
                probe = Probe::Blocked(holder);
            } else if row.view(me).is_some() {
                return Probe::Duplicate(format!("{kind} edge ({}, {}) already exists", pair.0, pair.1));
            }
        }
        probe
    }

    /// Whether `me` waiting on `holder` closes a cycle in the waits-for graph.
    fn would_deadlock(&self, me: TxId, holder: TxId) -> bool {
        let mut next = Some(holder);
        let mut hops = 0;
        while let Some(tx) = next {
            if tx == me {
                return true;
            }
            hops += 1;
            if hops > self.waits_for.len() {
                return false;
            }
            next = self.waits_for.get(&tx).copied();
        }
        false
    }

    fn settle(&mut self, key: Key, me: TxId, commit: bool) {
        match key {
            Key::User(id) => settle_in(&mut self.users, id, me, commit),
            Key::Named(kind, id) => settle_in(self.named_mut(kind), id, me, commit),
            Key::Edge(kind, pair) => settle_in(self.edges_mut(kind), pair, me, commit),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,
    /// Signalled whenever a transaction commits or rolls back.
    released: Notify,
    next_tx: AtomicU64,
}

impl Shared {
    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

/// In-memory access-control store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RbacStore for InMemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let id = self.shared.next_tx.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(Box::new(InMemoryTx {
            shared: self.shared.clone(),
            id,
            touched: Vec::new(),
            finished: false,
        }))
    }
}

struct InMemoryTx {
    shared: Arc<Shared>,
    id: TxId,
    touched: Vec<Key>,
    finished: bool,
}

impl InMemoryTx {
    /// Run `attempt` under the table lock, waiting for the holder to release
    /// whenever it reports [`Step::Blocked`].
    async fn write_when_clear<T, F>(&mut self, mut attempt: F) -> StoreResult<T>
    where
        F: FnMut(&mut Tables, TxId, &mut Vec<Key>) -> StoreResult<Step<T>> + Send,
        T: Send,
    {
        loop {
            let released = self.shared.released.notified();
            {
                let mut tables = self.shared.lock()?;
                tables.waits_for.remove(&self.id);
                match attempt(&mut tables, self.id, &mut self.touched)? {
                    Step::Done(out) => return Ok(out),
                    Step::Blocked(holder) => {
                        if tables.would_deadlock(self.id, holder) {
                            tracing::debug!(tx = self.id, holder, "deadlock detected");
                            return Err(StoreError::Deadlock(format!(
                                "transaction {} would wait on {holder}, which waits on it",
                                self.id
                            )));
                        }
                        tables.waits_for.insert(self.id, holder);
                    }
                }
            }
            released.await;
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Tables, TxId) -> T) -> StoreResult<T> {
        let tables = self.shared.lock()?;
        Ok(f(&tables, self.id))
    }

    fn finish(&mut self, commit: bool) {
        if self.finished {
            return;
        }
        self.finished = true;

        let mut tables = match self.shared.tables.lock() {
            Ok(t) => t,
            Err(poisoned) => poisoned.into_inner(),
        };
        for key in std::mem::take(&mut self.touched) {
            tables.settle(key, self.id, commit);
        }
        tables.waits_for.remove(&self.id);

        drop(tables);
        self.shared.released.notify_waiters();
    }

    async fn delete_edges_where<M>(&mut self, kind: EdgeKind, matches: M) -> StoreResult<u64>
    where
        M: Fn(&Pair) -> bool + Send + Sync,
    {
        self.write_when_clear(|t, me, touched| {
            let table = t.edges_mut(kind);
            // Only committed rows are contended; another transaction's pending insert stays invisible.
            if let Some(holder) = table
                .iter()
                .filter(|(pair, row)| row.deleting_by_other(me) && matches(*pair))
                .find_map(|(_, row)| row.holder(me))
            {
                return Ok(Step::Blocked(holder));
            }

            let mut removed = 0;
            for (pair, row) in table.iter_mut() {
                if row.holder(me).is_none() && row.view(me).is_some() && matches(pair) {
                    row.stage(me, None);
                    touched.push(Key::Edge(kind, *pair));
                    removed += 1;
                }
            }
            Ok(Step::Done(removed))
        })
        .await
    }
}

impl Drop for InMemoryTx {
    fn drop(&mut self) {
        self.finish(false);
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn missing_ids(&mut self, kind: EntityKind, ids: &[Uuid]) -> StoreResult<Vec<Uuid>> {
        self.read(|t, me| {
            ids.iter()
                .copied()
                .filter(|id| !t.entity_visible(kind, *id, me))
                .collect()
        })
    }

    async fn count_users(&mut self) -> StoreResult<u64> {
        self.read(|t, me| t.users.values().filter(|r| r.view(me).is_some()).count() as u64)
    }

    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        let email_key = user.email.to_lowercase();
        self.write_when_clear(|t, me, touched| {
            let id = *user.id.as_uuid();
            if let Some(row) = t.users.get(&id) {
                if let Some(holder) = row.holder(me) {
                    return Ok(Step::Blocked(holder));
                }
                if row.view(me).is_some() {
                    return Err(StoreError::UniqueViolation(format!("user id {id} already exists")));
                }
            }
            match t.probe_user_email(&email_key, id, me) {
                Probe::Duplicate(msg) => Err(StoreError::UniqueViolation(msg)),
                Probe::Blocked(holder) => Ok(Step::Blocked(holder)),
                Probe::Clear => {
                    t.users
                        .entry(id)
                        .or_insert_with(Row::vacant)
                        .stage(me, Some(user.clone()));
                    touched.push(Key::User(id));
                    Ok(Step::Done(()))
                }
            }
        })
        .await
    }

    async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        self.read(|t, me| t.users.get(id.as_uuid()).and_then(|r| r.view(me)).cloned())
    }

    async fn find_user_by_email(&mut self, email_key: &str) -> StoreResult<Option<User>> {
        self.read(|t, me| {
            t.users
                .values()
                .filter_map(|r| r.view(me))
                .find(|u| u.email.to_lowercase() == email_key)
                .cloned()
        })
    }

    async fn list_users(&mut self) -> StoreResult<Vec<User>> {
        self.read(|t, me| {
            let mut users: Vec<User> = t.users.values().filter_map(|r| r.view(me)).cloned().collect();
            users.sort_by(|a, b| a.email.to_lowercase().cmp(&b.email.to_lowercase()));
            users
        })
    }

    async fn update_user(&mut self, user: &User, expected: ExpectedVersion) -> StoreResult<User> {
        let email_key = user.email.to_lowercase();
        self.write_when_clear(|t, me, touched| {
            let id = *user.id.as_uuid();
            let Some(row) = t.users.get(&id) else {
                return Err(StoreError::RowNotFound(format!("user {id}")));
            };
            if let Some(holder) = row.holder(me) {
                return Ok(Step::Blocked(holder));
            }
            let Some(current) = row.view(me).cloned() else {
                return Err(StoreError::RowNotFound(format!("user {id}")));
            };
            if !expected.matches(current.version) {
                return Err(StoreError::VersionConflict(format!(
                    "user {id}: expected {expected:?}, found {}",
                    current.version
                )));
            }
            match t.probe_user_email(&email_key, id, me) {
                Probe::Duplicate(msg) => return Err(StoreError::UniqueViolation(msg)),
                Probe::Blocked(holder) => return Ok(Step::Blocked(holder)),
                Probe::Clear => {}
            }

            let mut updated = user.clone();
            updated.created_at = current.created_at;
            updated.version = current.version + 1;
            if let Some(row) = t.users.get_mut(&id) {
                row.stage(me, Some(updated.clone()));
            }
            touched.push(Key::User(id));
            Ok(Step::Done(updated))
        })
        .await
    }

    async fn insert_named(&mut self, kind: EntityKind, row: &NamedRow) -> StoreResult<()> {
        let name_key = row.name.to_lowercase();
        self.write_when_clear(|t, me, touched| {
            if let Some(existing) = t.named.get(&kind).and_then(|tbl| tbl.get(&row.id)) {
                if let Some(holder) = existing.holder(me) {
                    return Ok(Step::Blocked(holder));
                }
                if existing.view(me).is_some() {
                    return Err(StoreError::UniqueViolation(format!("{kind} id {} already exists", row.id)));
                }
            }
            match t.probe_name(kind, &name_key, row.id, me) {
                Probe::Duplicate(msg) => Err(StoreError::UniqueViolation(msg)),
                Probe::Blocked(holder) => Ok(Step::Blocked(holder)),
                Probe::Clear => {
                    t.named_mut(kind)
                        .entry(row.id)
                        .or_insert_with(Row::vacant)
                        .stage(me, Some(row.clone()));
                    touched.push(Key::Named(kind, row.id));
                    Ok(Step::Done(()))
                }
            }
        })
        .await
    }

    async fn find_named(&mut self, kind: EntityKind, id: Uuid) -> StoreResult<Option<NamedRow>> {
        self.read(|t, me| {
            t.named
                .get(&kind)
                .and_then(|tbl| tbl.get(&id))
                .and_then(|r| r.view(me))
                .cloned()
        })
    }

    async fn find_named_by_name(&mut self, kind: EntityKind, name_key: &str) -> StoreResult<Option<NamedRow>> {
        self.read(|t, me| {
            t.named
                .get(&kind)
                .and_then(|tbl| {
                    tbl.values()
                        .filter_map(|r| r.view(me))
                        .find(|r| r.name.to_lowercase() == name_key)
                })
                .cloned()
        })
    }

    async fn list_named(&mut self, kind: EntityKind) -> StoreResult<Vec<NamedRow>> {
        self.read(|t, me| {
            let mut rows: Vec<NamedRow> = t
                .named
                .get(&kind)
                .into_iter()
                .flat_map(|tbl| tbl.values())
                .filter_map(|r| r.view(me))
                .cloned()
                .collect();
            rows.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
            rows
        })
    }

    async fn names_of(&mut self, kind: EntityKind, ids: &[Uuid]) -> StoreResult<Vec<String>> {
        self.read(|t, me| {
            let Some(tbl) = t.named.get(&kind) else {
                return Vec::new();
            };
            ids.iter()
                .filter_map(|id| tbl.get(id))
                .filter_map(|r| r.view(me))
                .map(|r| r.name.clone())
                .collect()
        })
    }

    async fn rename_named(
        &mut self,
        kind: EntityKind,
        id: Uuid,
        name: &str,
        expected: ExpectedVersion,
    ) -> StoreResult<NamedRow> {
        let name_key = name.to_lowercase();
        self.write_when_clear(|t, me, touched| {
            let Some(row) = t.named.get(&kind).and_then(|tbl| tbl.get(&id)) else {
                return Err(StoreError::RowNotFound(format!("{kind} {id}")));
            };
            if let Some(holder) = row.holder(me) {
                return Ok(Step::Blocked(holder));
            }
            let Some(current) = row.view(me).cloned() else {
                return Err(StoreError::RowNotFound(format!("{kind} {id}")));
            };
            if !expected.matches(current.version) {
                return Err(StoreError::VersionConflict(format!(
                    "{kind} {id}: expected {expected:?}, found {}",
                    current.version
                )));
            }
            match t.probe_name(kind, &name_key, id, me) {
                Probe::Duplicate(msg) => return Err(StoreError::UniqueViolation(msg)),
                Probe::Blocked(holder) => return Ok(Step::Blocked(holder)),
                Probe::Clear => {}
            }

            let updated = NamedRow {
                id,
                name: name.to_string(),
                version: current.version + 1,
            };
            if let Some(row) = t.named_mut(kind).get_mut(&id) {
                row.stage(me, Some(updated.clone()));
            }
            touched.push(Key::Named(kind, id));
            Ok(Step::Done(updated))
        })
        .await
    }

    async fn delete_entities(&mut self, kind: EntityKind, ids: &[Uuid]) -> StoreResult<u64> {
        self.write_when_clear(|t, me, touched| {
            for (edge, side) in EdgeKind::referencing(kind) {
                let Some(tbl) = t.edges.get(&edge) else {
                    continue;
                };
                for (pair, row) in tbl.iter().filter(|(pair, _)| touches(pair, side, ids)) {
                    if let Some(holder) = row.holder(me) {
                        return Ok(Step::Blocked(holder));
                    }
                    if row.view(me).is_some() {
                        return Err(StoreError::ForeignKeyViolation(format!(
                            "{edge} edge ({}, {}) references a {kind} being deleted",
                            pair.0, pair.1
                        )));
                    }
                }
            }

            let mut doomed = Vec::with_capacity(ids.len());
            for target in ids {
                let peek = t.peek_entity(kind, *target, me);
                if let Some(holder) = peek.holder {
                    return Ok(Step::Blocked(holder));
                }
                if peek.visible && !doomed.contains(target) {
                    doomed.push(*target);
                }
            }

            for target in &doomed {
                match kind {
                    EntityKind::User => {
                        if let Some(row) = t.users.get_mut(target) {
                            row.stage(me, None);
                        }
                        touched.push(Key::User(*target));
                    }
                    _ => {
                        if let Some(row) = t.named_mut(kind).get_mut(target) {
                            row.stage(me, None);
                        }
                        touched.push(Key::Named(kind, *target));
                    }
                }
            }
            Ok(Step::Done(doomed.len() as u64))
        })
        .await
    }

    async fn edges_within(&mut self, kind: EdgeKind, lefts: &[Uuid], rights: &[Uuid]) -> StoreResult<Vec<(Uuid, Uuid)>> {
        self.read(|t, me| {
            t.visible_edges(kind, me)
                .filter(|(l, r)| contains(lefts, l) && contains(rights, r))
                .collect()
        })
    }

    async fn edges_touching(&mut self, kind: EdgeKind, side: Side, ids: &[Uuid]) -> StoreResult<Vec<(Uuid, Uuid)>> {
        self.read(|t, me| {
            t.visible_edges(kind, me)
                .filter(|pair| touches(pair, side, ids))
                .collect()
        })
    }

    async fn insert_edges(&mut self, kind: EdgeKind, pairs: &[(Uuid, Uuid)]) -> StoreResult<u64> {
        self.write_when_clear(|t, me, touched| {
            match t.probe_edges(kind, pairs, me) {
                Probe::Duplicate(msg) => return Err(StoreError::UniqueViolation(msg)),
                Probe::Blocked(holder) => return Ok(Step::Blocked(holder)),
                Probe::Clear => {}
            }
            for (l, r) in pairs {
                for (end, id) in [(kind.left(), l), (kind.right(), r)] {
                    let peek = t.peek_entity(end, *id, me);
                    match peek.holder {
                        Some(holder) if peek.deleting => return Ok(Step::Blocked(holder)),
                        _ if !peek.visible => {
                            return Err(StoreError::ForeignKeyViolation(format!("{end} {id} does not exist")));
                        }
                        _ => {}
                    }
                }
            }

            let table = t.edges_mut(kind);
            for pair in pairs {
                table.entry(*pair).or_insert_with(Row::vacant).stage(me, Some(()));
                touched.push(Key::Edge(kind, *pair));
            }
            Ok(Step::Done(pairs.len() as u64))
        })
        .await
    }

    async fn delete_edges_within(&mut self, kind: EdgeKind, lefts: &[Uuid], rights: &[Uuid]) -> StoreResult<u64> {
        self.delete_edges_where(kind, |(l, r)| contains(lefts, l) && contains(rights, r))
            .await
    }

    async fn delete_edges_touching(&mut self, kind: EdgeKind, side: Side, ids: &[Uuid]) -> StoreResult<u64> {
        self.delete_edges_where(kind, |pair| touches(pair, side, ids)).await
    }

    async fn commit(mut self: Box<Self>) -> StoreResult<()> {
        self.finish(true);
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> StoreResult<()> {
        self.finish(false);
        Ok(())
    }
}
