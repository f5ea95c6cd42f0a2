//! Transactional storage for entities and edge sets.
//!
//! Two implementations share one contract:
//! - [`InMemoryStore`] for tests and local runs
//! - [`PgStore`] for production (PostgreSQL via `sqlx`)

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStore;
pub use postgres::PgStore;
pub use r#trait::{NamedRow, RbacStore, StoreError, StoreResult, StoreTx};
