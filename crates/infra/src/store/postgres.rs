//! Postgres-backed access-control store.
//!
//! ## Schema
//!
//! One table per entity kind (`rbac_users`, `rbac_roles`, `rbac_groups`,
//! `rbac_permissions`) with a case-insensitive unique index on the natural key,
//! and one table per edge set with a composite primary key and plain
//! `REFERENCES` constraints. There is deliberately no `ON DELETE CASCADE`:
//! cascading is done explicitly by the cascade coordinator, in the same
//! transaction, and a missed edge surfaces as a foreign-key violation.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `UniqueViolation` |
//! | Database (foreign key violation) | `23503` | `ForeignKeyViolation` |
//! | Database (other) | Any other | `Backend` |
//! | PoolTimedOut / PoolClosed / Io / Tls | N/A | `Unavailable` |
//! | RowNotFound | N/A | `RowNotFound` |
//! | Other | N/A | `Backend` |
//!
//! ## Savepoints
//!
//! Any failed statement aborts a Postgres transaction. Every write therefore
//! runs inside its own savepoint which is rolled back on failure, keeping the
//! outer transaction usable after a `UniqueViolation`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use gatekeep_core::{EdgeKind, EntityKind, ExpectedVersion, Side, User, UserId};

use super::r#trait::{NamedRow, RbacStore, StoreError, StoreResult, StoreTx};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS rbac_users (
        id            UUID PRIMARY KEY,
        email         TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        enabled       BOOLEAN NOT NULL,
        version       BIGINT NOT NULL DEFAULT 0,
        created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS rbac_users_email_key ON rbac_users (lower(email))",
    r#"
    CREATE TABLE IF NOT EXISTS rbac_roles (
        id      UUID PRIMARY KEY,
        name    TEXT NOT NULL,
        version BIGINT NOT NULL DEFAULT 0
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS rbac_roles_name_key ON rbac_roles (lower(name))",
    r#"
    CREATE TABLE IF NOT EXISTS rbac_groups (
        id      UUID PRIMARY KEY,
        name    TEXT NOT NULL,
        version BIGINT NOT NULL DEFAULT 0
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS rbac_groups_name_key ON rbac_groups (lower(name))",
    r#"
    CREATE TABLE IF NOT EXISTS rbac_permissions (
        id      UUID PRIMARY KEY,
        name    TEXT NOT NULL,
        version BIGINT NOT NULL DEFAULT 0
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS rbac_permissions_name_key ON rbac_permissions (lower(name))",
    r#"
    CREATE TABLE IF NOT EXISTS user_roles (
        user_id UUID NOT NULL REFERENCES rbac_users (id),
        role_id UUID NOT NULL REFERENCES rbac_roles (id),
        PRIMARY KEY (user_id, role_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_groups (
        user_id  UUID NOT NULL REFERENCES rbac_users (id),
        group_id UUID NOT NULL REFERENCES rbac_groups (id),
        PRIMARY KEY (user_id, group_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS group_roles (
        group_id UUID NOT NULL REFERENCES rbac_groups (id),
        role_id  UUID NOT NULL REFERENCES rbac_roles (id),
        PRIMARY KEY (group_id, role_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS role_permissions (
        role_id       UUID NOT NULL REFERENCES rbac_roles (id),
        permission_id UUID NOT NULL REFERENCES rbac_permissions (id),
        PRIMARY KEY (role_id, permission_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS user_roles_role_idx ON user_roles (role_id)",
    "CREATE INDEX IF NOT EXISTS user_groups_group_idx ON user_groups (group_id)",
    "CREATE INDEX IF NOT EXISTS group_roles_role_idx ON group_roles (role_id)",
    "CREATE INDEX IF NOT EXISTS role_permissions_permission_idx ON role_permissions (permission_id)",
];

fn entity_table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::User => "rbac_users",
        EntityKind::Role => "rbac_roles",
        EntityKind::Group => "rbac_groups",
        EntityKind::Permission => "rbac_permissions",
    }
}

/// `(table, left column, right column)` for an edge set.
fn edge_table(kind: EdgeKind) -> (&'static str, &'static str, &'static str) {
    match kind {
        EdgeKind::UserRole => ("user_roles", "user_id", "role_id"),
        EdgeKind::UserGroup => ("user_groups", "user_id", "group_id"),
        EdgeKind::GroupRole => ("group_roles", "group_id", "role_id"),
        EdgeKind::RolePermission => ("role_permissions", "role_id", "permission_id"),
    }
}

fn side_column(kind: EdgeKind, side: Side) -> &'static str {
    let (_, left, right) = edge_table(kind);
    match side {
        Side::Left => left,
        Side::Right => right,
    }
}

/// Postgres access-control store.
///
/// `Clone` is cheap; the pool is reference counted internally.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool to `database_url`.
    #[instrument(skip(database_url), err)]
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        tracing::info!(statements = SCHEMA.len(), "schema ensured");
        Ok(())
    }
}

#[async_trait]
impl RbacStore for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PgTx { tx }))
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl PgTx {
    async fn savepoint(&mut self) -> StoreResult<()> {
        sqlx::query("SAVEPOINT gatekeep_write")
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("savepoint", e))?;
        Ok(())
    }

    /// Release the savepoint on success, roll back to it on failure.
    async fn settle<T>(&mut self, op: &'static str, result: Result<T, sqlx::Error>) -> StoreResult<T> {
        match result {
            Ok(value) => {
                sqlx::query("RELEASE SAVEPOINT gatekeep_write")
                    .execute(&mut *self.tx)
                    .await
                    .map_err(|e| map_sqlx_error("release_savepoint", e))?;
                Ok(value)
            }
            Err(e) => {
                sqlx::query("ROLLBACK TO SAVEPOINT gatekeep_write")
                    .execute(&mut *self.tx)
                    .await
                    .map_err(|e| map_sqlx_error("rollback_to_savepoint", e))?;
                Err(map_sqlx_error(op, e))
            }
        }
    }

    async fn pairs(&mut self, op: &'static str, sql: &str, a: &[Uuid], b: Option<&[Uuid]>) -> StoreResult<Vec<(Uuid, Uuid)>> {
        let mut query = sqlx::query_as::<_, (Uuid, Uuid)>(sql).bind(a);
        if let Some(b) = b {
            query = query.bind(b);
        }
        query
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(op, e))
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, enabled, version, created_at";

#[async_trait]
impl StoreTx for PgTx {
    #[instrument(skip(self, ids), fields(kind = %kind, requested = ids.len()), err)]
    async fn missing_ids(&mut self, kind: EntityKind, ids: &[Uuid]) -> StoreResult<Vec<Uuid>> {
        let sql = format!("SELECT id FROM {} WHERE id = ANY($1)", entity_table(kind));
        let found: Vec<Uuid> = sqlx::query_scalar(&sql)
            .bind(ids)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("missing_ids", e))?;
        Ok(ids.iter().copied().filter(|id| !found.contains(id)).collect())
    }

    async fn count_users(&mut self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM rbac_users")
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("count_users", e))?;
        Ok(count as u64)
    }

    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        self.savepoint().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO rbac_users (id, email, password_hash, enabled, version, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.enabled)
        .bind(user.version as i64)
        .bind(user.created_at)
        .execute(&mut *self.tx)
        .await;
        self.settle("insert_user", result).await?;
        Ok(())
    }

    async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM rbac_users WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_user", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email(&mut self, email_key: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM rbac_users WHERE lower(email) = $1");
        let row = sqlx::query(&sql)
            .bind(email_key)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_email", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_users(&mut self) -> StoreResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM rbac_users ORDER BY lower(email)");
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?;
        rows.iter().map(user_from_row).collect()
    }

    #[instrument(skip(self, user), fields(user_id = %user.id, expected = ?expected), err)]
    async fn update_user(&mut self, user: &User, expected: ExpectedVersion) -> StoreResult<User> {
        let expected_raw = match expected {
            ExpectedVersion::Any => None,
            ExpectedVersion::Exact(v) => Some(v as i64),
        };
        let sql = format!(
            r#"
            UPDATE rbac_users
            SET email = $2, password_hash = $3, enabled = $4, version = version + 1
            WHERE id = $1 AND ($5::bigint IS NULL OR version = $5)
            RETURNING {USER_COLUMNS}
            "#
        );

        self.savepoint().await?;
        let result = sqlx::query(&sql)
            .bind(user.id.as_uuid())
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.enabled)
            .bind(expected_raw)
            .fetch_optional(&mut *self.tx)
            .await;
        let row = self.settle("update_user", result).await?;

        match row {
            Some(row) => user_from_row(&row),
            None => match self.find_user(user.id).await? {
                Some(current) => Err(StoreError::VersionConflict(format!(
                    "user {}: expected {expected:?}, found {}",
                    user.id, current.version
                ))),
                None => Err(StoreError::RowNotFound(format!("user {}", user.id))),
            },
        }
    }

    #[instrument(skip(self, row), fields(kind = %kind, id = %row.id), err)]
    async fn insert_named(&mut self, kind: EntityKind, row: &NamedRow) -> StoreResult<()> {
        let sql = format!("INSERT INTO {} (id, name, version) VALUES ($1, $2, $3)", entity_table(kind));
        self.savepoint().await?;
        let result = sqlx::query(&sql)
            .bind(row.id)
            .bind(&row.name)
            .bind(row.version as i64)
            .execute(&mut *self.tx)
            .await;
        self.settle("insert_named", result).await?;
        Ok(())
    }

    async fn find_named(&mut self, kind: EntityKind, id: Uuid) -> StoreResult<Option<NamedRow>> {
        let sql = format!("SELECT id, name, version FROM {} WHERE id = $1", entity_table(kind));
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_named", e))?;
        row.as_ref().map(named_from_row).transpose()
    }

    async fn find_named_by_name(&mut self, kind: EntityKind, name_key: &str) -> StoreResult<Option<NamedRow>> {
        let sql = format!(
            "SELECT id, name, version FROM {} WHERE lower(name) = $1",
            entity_table(kind)
        );
        let row = sqlx::query(&sql)
            .bind(name_key)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_named_by_name", e))?;
        row.as_ref().map(named_from_row).transpose()
    }

    async fn list_named(&mut self, kind: EntityKind) -> StoreResult<Vec<NamedRow>> {
        let sql = format!(
            "SELECT id, name, version FROM {} ORDER BY lower(name)",
            entity_table(kind)
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_named", e))?;
        rows.iter().map(named_from_row).collect()
    }

    async fn names_of(&mut self, kind: EntityKind, ids: &[Uuid]) -> StoreResult<Vec<String>> {
        let sql = format!("SELECT name FROM {} WHERE id = ANY($1)", entity_table(kind));
        sqlx::query_scalar(&sql)
            .bind(ids)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("names_of", e))
    }

    #[instrument(skip(self, name), fields(kind = %kind, id = %id, expected = ?expected), err)]
    async fn rename_named(
        &mut self,
        kind: EntityKind,
        id: Uuid,
        name: &str,
        expected: ExpectedVersion,
    ) -> StoreResult<NamedRow> {
        let expected_raw = match expected {
            ExpectedVersion::Any => None,
            ExpectedVersion::Exact(v) => Some(v as i64),
        };
        let sql = format!(
            r#"
            UPDATE {}
            SET name = $2, version = version + 1
            WHERE id = $1 AND ($3::bigint IS NULL OR version = $3)
            RETURNING id, name, version
            "#,
            entity_table(kind)
        );

        self.savepoint().await?;
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(name)
            .bind(expected_raw)
            .fetch_optional(&mut *self.tx)
            .await;
        let row = self.settle("rename_named", result).await?;

        match row {
            Some(row) => named_from_row(&row),
            None => match self.find_named(kind, id).await? {
                Some(current) => Err(StoreError::VersionConflict(format!(
                    "{kind} {id}: expected {expected:?}, found {}",
                    current.version
                ))),
                None => Err(StoreError::RowNotFound(format!("{kind} {id}"))),
            },
        }
    }

    #[instrument(skip(self, ids), fields(kind = %kind, requested = ids.len()), err)]
    async fn delete_entities(&mut self, kind: EntityKind, ids: &[Uuid]) -> StoreResult<u64> {
        let sql = format!("DELETE FROM {} WHERE id = ANY($1)", entity_table(kind));
        self.savepoint().await?;
        let result = sqlx::query(&sql).bind(ids).execute(&mut *self.tx).await;
        let done = self.settle("delete_entities", result).await?;
        Ok(done.rows_affected())
    }

    async fn edges_within(&mut self, kind: EdgeKind, lefts: &[Uuid], rights: &[Uuid]) -> StoreResult<Vec<(Uuid, Uuid)>> {
        let (table, l, r) = edge_table(kind);
        let sql = format!("SELECT {l}, {r} FROM {table} WHERE {l} = ANY($1) AND {r} = ANY($2)");
        self.pairs("edges_within", &sql, lefts, Some(rights)).await
    }

    async fn edges_touching(&mut self, kind: EdgeKind, side: Side, ids: &[Uuid]) -> StoreResult<Vec<(Uuid, Uuid)>> {
        let (table, l, r) = edge_table(kind);
        let column = side_column(kind, side);
        let sql = format!("SELECT {l}, {r} FROM {table} WHERE {column} = ANY($1)");
        self.pairs("edges_touching", &sql, ids, None).await
    }

    #[instrument(skip(self, pairs), fields(edge = %kind, pairs = pairs.len()), err)]
    async fn insert_edges(&mut self, kind: EdgeKind, pairs: &[(Uuid, Uuid)]) -> StoreResult<u64> {
        let (table, l, r) = edge_table(kind);
        let (lefts, rights): (Vec<Uuid>, Vec<Uuid>) = pairs.iter().copied().unzip();
        let sql = format!("INSERT INTO {table} ({l}, {r}) SELECT * FROM UNNEST($1::uuid[], $2::uuid[])");

        self.savepoint().await?;
        let result = sqlx::query(&sql)
            .bind(&lefts)
            .bind(&rights)
            .execute(&mut *self.tx)
            .await;
        let done = self.settle("insert_edges", result).await?;
        Ok(done.rows_affected())
    }

    #[instrument(skip(self, lefts, rights), fields(edge = %kind), err)]
    async fn delete_edges_within(&mut self, kind: EdgeKind, lefts: &[Uuid], rights: &[Uuid]) -> StoreResult<u64> {
        let (table, l, r) = edge_table(kind);
        let sql = format!("DELETE FROM {table} WHERE {l} = ANY($1) AND {r} = ANY($2)");
        let done = sqlx::query(&sql)
            .bind(lefts)
            .bind(rights)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_edges_within", e))?;
        Ok(done.rows_affected())
    }

    #[instrument(skip(self, ids), fields(edge = %kind, side = ?side), err)]
    async fn delete_edges_touching(&mut self, kind: EdgeKind, side: Side, ids: &[Uuid]) -> StoreResult<u64> {
        let (table, _, _) = edge_table(kind);
        let column = side_column(kind, side);
        let sql = format!("DELETE FROM {table} WHERE {column} = ANY($1)");
        let done = sqlx::query(&sql)
            .bind(ids)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_edges_touching", e))?;
        Ok(done.rows_affected())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn user_from_row(row: &PgRow) -> StoreResult<User> {
    let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode user row: {e}"));
    let version: i64 = row.try_get("version").map_err(decode)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode)?;
    Ok(User {
        id: UserId::from_uuid(row.try_get("id").map_err(decode)?),
        email: row.try_get("email").map_err(decode)?,
        password_hash: row.try_get("password_hash").map_err(decode)?,
        enabled: row.try_get("enabled").map_err(decode)?,
        version: version as u64,
        created_at,
    })
}

fn named_from_row(row: &PgRow) -> StoreResult<NamedRow> {
    let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode named row: {e}"));
    let version: i64 = row.try_get("version").map_err(decode)?;
    Ok(NamedRow {
        id: row.try_get("id").map_err(decode)?,
        name: row.try_get("name").map_err(decode)?,
        version: version as u64,
    })
}

/// Map SQLx errors to `StoreError`.
///
/// Unique and foreign-key violations are classified by SQLSTATE so that the
/// services above can recover from them; everything else is opaque.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("{operation}: {}", db_err.message());
            classify_sqlstate(db_err.code().as_deref(), msg)
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("{operation}: connection pool exhausted or closed"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("{operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("{operation}: {e}")),
        sqlx::Error::RowNotFound => StoreError::RowNotFound(operation.to_string()),
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}

fn classify_sqlstate(code: Option<&str>, msg: String) -> StoreError {
    match code {
        Some("23505") => StoreError::UniqueViolation(msg),
        Some("23503") => StoreError::ForeignKeyViolation(msg),
        // deadlock_detected, serialization_failure
        Some("40P01") | Some("40001") => StoreError::Deadlock(msg),
        _ => StoreError::Backend(msg),
    }
}
