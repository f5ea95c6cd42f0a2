//! Relationship reconciler: idempotent bulk assign/deassign over the edge sets.
//!
//! ## Algorithm
//!
//! ```text
//! assign(lefts, rights)
//!   ↓
//! 1. Reject empty input (InvalidArgument)
//!   ↓
//! 2. Validate both ID sets exist (NotFound listing every missing ID)
//!   ↓
//! 3. candidates = lefts × rights; existing = edges within lefts/rights
//!   ↓
//! 4. delta = candidates − existing; empty delta → 0, no write
//!   ↓
//! 5. Bulk insert delta
//!      └─ UniqueViolation (a concurrent writer committed an overlapping pair)
//!           → re-read existing, recompute delta, retry
//! ```
//!
//! The uniqueness constraint is only the last-resort race guard; duplicate
//! avoidance itself comes from the delta computation in step 4.
//!
//! ## Counting
//!
//! The count returned is the number of rows this call inserted. Pairs that a
//! racing writer committed first are credited to that writer, so the counts of
//! two concurrent calls on the same pair always sum to 1.
//!
//! ## Composition
//!
//! [`assign_in`] / [`deassign_in`] run inside a caller-supplied transaction so
//! composite operations (registration, grouped requests, seeding) commit
//! atomically. [`EdgeReconciler`] wraps them with one transaction per call.
//!
//! ## Lock order
//!
//! Writes touch pairs in ascending `(left, right)` order: each call's delta is
//! built from sorted ID sets, and grouped requests are merged per left ID and
//! applied in ascending left order. Two grouped calls over overlapping pairs
//! therefore wait on each other in one direction only.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::marker::PhantomData;

use tracing::{debug, info, warn};
use uuid::Uuid;

use gatekeep_core::{DomainError, DomainResult, Edge, EntityId, EntityKind};

use crate::store::{RbacStore, StoreError, StoreTx};

/// Insert attempts before a persistently racing assign gives up with `Conflict`.
pub const MAX_INSERT_ATTEMPTS: usize = 3;

fn raw_unique<I: EntityId>(ids: &[I]) -> Vec<Uuid> {
    ids.iter()
        .map(EntityId::raw)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Merge entries sharing a left ID and order them by left ID.
fn ordered_entries<L: EntityId, R: EntityId>(entries: &[(L, Vec<R>)]) -> Vec<(L, Vec<R>)> {
    let mut merged: BTreeMap<Uuid, (L, Vec<R>)> = BTreeMap::new();
    for (left, rights) in entries {
        merged
            .entry(left.raw())
            .or_insert_with(|| (*left, Vec::new()))
            .1
            .extend(rights.iter().copied());
    }
    merged.into_values().collect()
}

/// Fail with `NotFound` naming every ID in `ids` that does not exist as `kind`.
pub(crate) async fn ensure_exist(tx: &mut dyn StoreTx, kind: EntityKind, ids: &[Uuid]) -> DomainResult<()> {
    let missing = tx.missing_ids(kind, ids).await?;
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DomainError::not_found(kind, missing))
    }
}

/// Assign every `left × right` pair of edge kind `E` inside `tx`.
///
/// Returns the number of edges this call inserted; pairs that already exist
/// are skipped, so repeating the call is a no-op.
pub async fn assign_in<E: Edge>(tx: &mut dyn StoreTx, lefts: &[E::Left], rights: &[E::Right]) -> DomainResult<u64> {
    if lefts.is_empty() || rights.is_empty() {
        return Err(DomainError::invalid_argument(format!(
            "{} assignment requires at least one {} and one {}",
            E::KIND,
            E::KIND.left(),
            E::KIND.right()
        )));
    }

    let lefts = raw_unique(lefts);
    let rights = raw_unique(rights);
    ensure_exist(tx, E::KIND.left(), &lefts).await?;
    ensure_exist(tx, E::KIND.right(), &rights).await?;

    for attempt in 1..=MAX_INSERT_ATTEMPTS {
        let existing: HashSet<(Uuid, Uuid)> = tx.edges_within(E::KIND, &lefts, &rights).await?.into_iter().collect();

        // Sorted inputs keep the delta in ascending (left, right) order.
        let delta: Vec<(Uuid, Uuid)> = lefts
            .iter()
            .flat_map(|l| rights.iter().map(move |r| (*l, *r)))
            .filter(|pair| !existing.contains(pair))
            .collect();

        if delta.is_empty() {
            debug!(edge = %E::KIND, attempt, "all requested edges already present");
            return Ok(0);
        }

        match tx.insert_edges(E::KIND, &delta).await {
            Ok(inserted) => return Ok(inserted),
            Err(StoreError::UniqueViolation(msg)) => {
                warn!(
                    edge = %E::KIND,
                    attempt,
                    error = %msg,
                    "concurrent assignment raced this one; recomputing delta"
                );
            }
            Err(StoreError::ForeignKeyViolation(msg)) => {
                return Err(DomainError::conflict(format!(
                    "{} endpoint removed concurrently: {msg}",
                    E::KIND
                )));
            }
            Err(other) => return Err(other.into()),
        }
    }

    Err(DomainError::conflict(format!(
        "{} assignment kept racing concurrent writers after {MAX_INSERT_ATTEMPTS} attempts",
        E::KIND
    )))
}

/// Remove every existing `left × right` pair of edge kind `E` inside `tx`.
///
/// Empty input is a no-op returning 0. Returns the number of rows removed.
pub async fn deassign_in<E: Edge>(tx: &mut dyn StoreTx, lefts: &[E::Left], rights: &[E::Right]) -> DomainResult<u64> {
    if lefts.is_empty() || rights.is_empty() {
        return Ok(0);
    }

    let lefts = raw_unique(lefts);
    let rights = raw_unique(rights);
    ensure_exist(tx, E::KIND.left(), &lefts).await?;
    ensure_exist(tx, E::KIND.right(), &rights).await?;

    Ok(tx.delete_edges_within(E::KIND, &lefts, &rights).await?)
}

/// Typed assign/deassign for one edge kind, one transaction per call.
pub struct EdgeReconciler<E, S> {
    store: S,
    _edge: PhantomData<fn() -> E>,
}

impl<E, S> EdgeReconciler<E, S>
where
    E: Edge,
    S: RbacStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            _edge: PhantomData,
        }
    }

    pub async fn assign(&self, lefts: &[E::Left], rights: &[E::Right]) -> DomainResult<u64> {
        let mut tx = self.store.begin().await?;
        let inserted = assign_in::<E>(tx.as_mut(), lefts, rights).await?;
        tx.commit().await?;

        info!(edge = %E::KIND, inserted, "edges assigned");
        Ok(inserted)
    }

    pub async fn deassign(&self, lefts: &[E::Left], rights: &[E::Right]) -> DomainResult<u64> {
        let mut tx = self.store.begin().await?;
        let removed = deassign_in::<E>(tx.as_mut(), lefts, rights).await?;
        tx.commit().await?;

        info!(edge = %E::KIND, removed, "edges deassigned");
        Ok(removed)
    }

    /// Assign each `(left, rights)` entry; all entries commit together or not at all.
    pub async fn assign_grouped(&self, entries: &[(E::Left, Vec<E::Right>)]) -> DomainResult<u64> {
        if entries.is_empty() {
            return Err(DomainError::invalid_argument(format!("{} assignment list is empty", E::KIND)));
        }
        if let Some((left, _)) = entries.iter().find(|(_, rights)| rights.is_empty()) {
            return Err(DomainError::invalid_argument(format!(
                "{} assignment for {} {left} lists no {}",
                E::KIND,
                E::KIND.left(),
                E::KIND.right()
            )));
        }

        let mut tx = self.store.begin().await?;
        let mut inserted = 0;
        for (left, rights) in &ordered_entries(entries) {
            inserted += assign_in::<E>(tx.as_mut(), std::slice::from_ref(left), rights).await?;
        }
        tx.commit().await?;

        info!(edge = %E::KIND, entries = entries.len(), inserted, "grouped edges assigned");
        Ok(inserted)
    }

    /// Deassign each `(left, rights)` entry in one transaction.
    pub async fn deassign_grouped(&self, entries: &[(E::Left, Vec<E::Right>)]) -> DomainResult<u64> {
        let mut tx = self.store.begin().await?;
        let mut removed = 0;
        for (left, rights) in &ordered_entries(entries) {
            removed += deassign_in::<E>(tx.as_mut(), std::slice::from_ref(left), rights).await?;
        }
        tx.commit().await?;

        info!(edge = %E::KIND, entries = entries.len(), removed, "grouped edges deassigned");
        Ok(removed)
    }
}
