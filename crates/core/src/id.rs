//! Strongly-typed identifiers for the four entity kinds.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::EntityKind;
use crate::error::DomainError;

/// Identifier of a user account.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

/// Identifier of a role.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(Uuid);

/// Identifier of a group.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(Uuid);

/// Identifier of a permission.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionId(Uuid);

/// Common surface of every entity identifier.
///
/// Edges and the store boundary work with raw UUIDs tagged by [`EntityKind`];
/// this trait is the bridge between the typed and the raw world.
pub trait EntityId:
    Copy + Eq + Ord + core::hash::Hash + core::fmt::Debug + core::fmt::Display + Send + Sync + 'static
{
    const KIND: EntityKind;

    fn from_raw(uuid: Uuid) -> Self;

    fn raw(&self) -> Uuid;
}

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal, $kind:expr) => {
        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl EntityId for $t {
            const KIND: EntityKind = $kind;

            fn from_raw(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn raw(&self) -> Uuid {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_argument(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(UserId, "UserId", EntityKind::User);
impl_uuid_newtype!(RoleId, "RoleId", EntityKind::Role);
impl_uuid_newtype!(GroupId, "GroupId", EntityKind::Group);
impl_uuid_newtype!(PermissionId, "PermissionId", EntityKind::Permission);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_garbage_as_invalid_argument() {
        let err = "not-a-uuid".parse::<RoleId>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(msg) if msg.starts_with("RoleId")));
    }

    #[test]
    fn raw_roundtrip_keeps_kind() {
        let id = GroupId::new();
        assert_eq!(GroupId::from_raw(id.raw()), id);
        assert_eq!(<GroupId as EntityId>::KIND, EntityKind::Group);
    }
}
