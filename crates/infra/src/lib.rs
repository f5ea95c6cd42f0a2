//! Infrastructure layer: transactional storage and the access-control services.
//!
//! ## Services
//!
//! - [`reconciler`]: idempotent bulk assign/deassign over the four edge sets
//! - [`cascade`]: entity deletion together with every referencing edge
//! - [`resolver`]: effective permissions (direct + group-inherited roles)
//! - [`gateway`]: login, registration, bearer-token → principal
//! - [`directory`]: entity administration and self-service account changes
//! - [`seed`]: deterministic bootstrap data
//!
//! Every service is generic over [`store::RbacStore`] and runs each call in one
//! store transaction.

pub mod cascade;
pub mod directory;
pub mod gateway;
pub mod reconciler;
pub mod resolver;
pub mod seed;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use cascade::{CascadeCoordinator, CascadeReport};
pub use directory::Directory;
pub use gateway::{AuthGateway, AuthSession};
pub use reconciler::{assign_in, deassign_in, EdgeReconciler, MAX_INSERT_ATTEMPTS};
pub use resolver::PermissionResolver;
pub use seed::seed_if_empty;
pub use store::{InMemoryStore, PgStore, RbacStore, StoreError, StoreTx};
