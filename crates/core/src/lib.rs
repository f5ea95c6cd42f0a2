//! `gatekeep-core`: domain foundation for the access-control graph.
//!
//! This crate contains **pure domain** primitives (no storage, no transport):
//! typed identifiers, entity records, the four edge kinds, and the error model.

pub mod edge;
pub mod entity;
pub mod error;
pub mod id;
pub mod model;
pub mod value_object;
pub mod version;

pub use edge::{Edge, EdgeKind, GroupRoleEdge, RolePermissionEdge, Side, UserGroupEdge, UserRoleEdge};
pub use entity::EntityKind;
pub use error::{DomainError, DomainResult};
pub use id::{EntityId, GroupId, PermissionId, RoleId, UserId};
pub use model::{Group, Named, Permission, Role, User};
pub use value_object::{check_password_policy, Email, EntityName, ValueObject, MIN_PASSWORD_LEN};
pub use version::ExpectedVersion;
