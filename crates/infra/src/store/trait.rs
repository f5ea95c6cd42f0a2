use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use gatekeep_core::{DomainError, EdgeKind, EntityKind, ExpectedVersion, Side, User, UserId};

/// Storage operation error.
///
/// These are **infrastructure errors**; services translate them into
/// [`DomainError`]s at the call site (see the `From` impl below for the default
/// translation, and the reconciler / cascade for the specialised ones).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write (natural key or edge pair).
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A foreign-key constraint rejected the write.
    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    /// Optimistic version check failed on update.
    #[error("version conflict: {0}")]
    VersionConflict(String),

    /// The row to update does not exist.
    #[error("row not found: {0}")]
    RowNotFound(String),

    /// The transaction lost a deadlock or serialization check and was aborted.
    /// Retrying it from the start is safe.
    #[error("transaction aborted: {0}")]
    Deadlock(String),

    /// Store unreachable (pool closed, timeout, IO).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Anything else.
    #[error("store failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::UniqueViolation(msg) => DomainError::DuplicateResource(msg),
            StoreError::ForeignKeyViolation(msg) => DomainError::InvalidArgument(format!("still referenced: {msg}")),
            StoreError::VersionConflict(msg) => DomainError::Conflict(msg),
            StoreError::RowNotFound(msg) => DomainError::Conflict(format!("row vanished concurrently: {msg}")),
            StoreError::Deadlock(msg) => DomainError::Conflict(format!("concurrent transaction conflict, retry: {msg}")),
            StoreError::Unavailable(msg) => DomainError::Unavailable(msg),
            StoreError::Backend(msg) => {
                tracing::error!(error = %msg, "unclassified store failure");
                DomainError::Internal
            }
        }
    }
}

/// Raw row of a named entity (role, group, permission).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRow {
    pub id: Uuid,
    pub name: String,
    pub version: u64,
}

/// One open transaction against the access-control store.
///
/// Every method runs inside the transaction; nothing becomes visible to other
/// transactions before [`StoreTx::commit`]. Dropping an uncommitted transaction
/// rolls it back.
///
/// ## Write atomicity
///
/// Each insert method is atomic on its own: when it fails with
/// [`StoreError::UniqueViolation`] nothing from that call was applied and the
/// transaction remains usable, so callers can re-read and retry.
///
/// ## Natural keys
///
/// `*_by_*` lookups take the case-insensitive key (`Email::key`,
/// `EntityName::key`); stored values keep their original casing.
#[async_trait]
pub trait StoreTx: Send {
    // ── entities ───────────────────────────────────────────────────────────

    /// IDs among `ids` that do not exist as `kind`.
    async fn missing_ids(&mut self, kind: EntityKind, ids: &[Uuid]) -> StoreResult<Vec<Uuid>>;

    async fn count_users(&mut self) -> StoreResult<u64>;

    async fn insert_user(&mut self, user: &User) -> StoreResult<()>;

    async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&mut self, email_key: &str) -> StoreResult<Option<User>>;

    async fn list_users(&mut self) -> StoreResult<Vec<User>>;

    /// Overwrite email/password/enabled, checking `expected` against the stored
    /// version. Returns the row with its bumped version.
    async fn update_user(&mut self, user: &User, expected: ExpectedVersion) -> StoreResult<User>;

    async fn insert_named(&mut self, kind: EntityKind, row: &NamedRow) -> StoreResult<()>;

    async fn find_named(&mut self, kind: EntityKind, id: Uuid) -> StoreResult<Option<NamedRow>>;

    async fn find_named_by_name(&mut self, kind: EntityKind, name_key: &str) -> StoreResult<Option<NamedRow>>;

    async fn list_named(&mut self, kind: EntityKind) -> StoreResult<Vec<NamedRow>>;

    /// Names of the given entities (unknown IDs are skipped).
    async fn names_of(&mut self, kind: EntityKind, ids: &[Uuid]) -> StoreResult<Vec<String>>;

    async fn rename_named(
        &mut self,
        kind: EntityKind,
        id: Uuid,
        name: &str,
        expected: ExpectedVersion,
    ) -> StoreResult<NamedRow>;

    /// Delete base entity rows. Fails with `ForeignKeyViolation` if any edge
    /// still references one of them.
    async fn delete_entities(&mut self, kind: EntityKind, ids: &[Uuid]) -> StoreResult<u64>;

    // ── edges ──────────────────────────────────────────────────────────────

    /// Existing pairs with `left ∈ lefts` and `right ∈ rights`.
    async fn edges_within(&mut self, kind: EdgeKind, lefts: &[Uuid], rights: &[Uuid]) -> StoreResult<Vec<(Uuid, Uuid)>>;

    /// Existing pairs whose `side` end is in `ids`.
    async fn edges_touching(&mut self, kind: EdgeKind, side: Side, ids: &[Uuid]) -> StoreResult<Vec<(Uuid, Uuid)>>;

    /// Insert all pairs or none. Returns the number of rows inserted.
    async fn insert_edges(&mut self, kind: EdgeKind, pairs: &[(Uuid, Uuid)]) -> StoreResult<u64>;

    /// Delete pairs with `left ∈ lefts` and `right ∈ rights`; returns rows removed.
    async fn delete_edges_within(&mut self, kind: EdgeKind, lefts: &[Uuid], rights: &[Uuid]) -> StoreResult<u64>;

    /// Delete pairs whose `side` end is in `ids`; returns rows removed.
    async fn delete_edges_touching(&mut self, kind: EdgeKind, side: Side, ids: &[Uuid]) -> StoreResult<u64>;

    // ── lifecycle ──────────────────────────────────────────────────────────

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Transactional access-control store (entities + the four edge sets).
///
/// ## Design Principles
///
/// - **No storage assumptions**: the in-memory implementation backs tests/dev,
///   the Postgres implementation backs production
/// - **Uniqueness is the only edge concurrency mechanism**: no application
///   locks; a racing duplicate surfaces as [`StoreError::UniqueViolation`]
/// - **Row waits, never hangs**: a write blocked on another transaction's row
///   waits for it; a wait cycle aborts one side with [`StoreError::Deadlock`]
/// - **Read committed**: uncommitted writes of other transactions are invisible
#[async_trait]
pub trait RbacStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;
}

#[async_trait]
impl<S> RbacStore for Arc<S>
where
    S: RbacStore + ?Sized,
{
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        (**self).begin().await
    }
}
