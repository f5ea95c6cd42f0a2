//! The four fixed edge kinds of the access-control graph.
//!
//! An edge is an ordered pair `(left, right)` of entity IDs with no payload and
//! no identity beyond the pair. Each kind is stored in its own edge set with a
//! uniqueness constraint on the pair.

use serde::{Deserialize, Serialize};

use crate::entity::EntityKind;
use crate::id::{EntityId, GroupId, PermissionId, RoleId, UserId};

/// Runtime tag of an edge set.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    UserRole,
    UserGroup,
    GroupRole,
    RolePermission,
}

/// Which end of an edge an ID sits on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 4] = [
        EdgeKind::UserRole,
        EdgeKind::UserGroup,
        EdgeKind::GroupRole,
        EdgeKind::RolePermission,
    ];

    pub fn left(self) -> EntityKind {
        match self {
            EdgeKind::UserRole | EdgeKind::UserGroup => EntityKind::User,
            EdgeKind::GroupRole => EntityKind::Group,
            EdgeKind::RolePermission => EntityKind::Role,
        }
    }

    pub fn right(self) -> EntityKind {
        match self {
            EdgeKind::UserRole | EdgeKind::GroupRole => EntityKind::Role,
            EdgeKind::UserGroup => EntityKind::Group,
            EdgeKind::RolePermission => EntityKind::Permission,
        }
    }

    pub fn side_kind(self, side: Side) -> EntityKind {
        match side {
            Side::Left => self.left(),
            Side::Right => self.right(),
        }
    }

    /// Every `(edge kind, side)` at which an entity of `kind` can be referenced.
    pub fn referencing(kind: EntityKind) -> Vec<(EdgeKind, Side)> {
        let mut out = Vec::new();
        for edge in Self::ALL {
            if edge.left() == kind {
                out.push((edge, Side::Left));
            }
            if edge.right() == kind {
                out.push((edge, Side::Right));
            }
        }
        out
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::UserRole => "user_role",
            EdgeKind::UserGroup => "user_group",
            EdgeKind::GroupRole => "group_role",
            EdgeKind::RolePermission => "role_permission",
        }
    }
}

impl core::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compile-time description of an edge kind.
pub trait Edge: Send + Sync + 'static {
    type Left: EntityId;
    type Right: EntityId;

    const KIND: EdgeKind;
}

/// User → Role.
#[derive(Debug, Copy, Clone)]
pub struct UserRoleEdge;

/// User → Group.
#[derive(Debug, Copy, Clone)]
pub struct UserGroupEdge;

/// Group → Role.
#[derive(Debug, Copy, Clone)]
pub struct GroupRoleEdge;

/// Role → Permission.
#[derive(Debug, Copy, Clone)]
pub struct RolePermissionEdge;

impl Edge for UserRoleEdge {
    type Left = UserId;
    type Right = RoleId;
    const KIND: EdgeKind = EdgeKind::UserRole;
}

impl Edge for UserGroupEdge {
    type Left = UserId;
    type Right = GroupId;
    const KIND: EdgeKind = EdgeKind::UserGroup;
}

impl Edge for GroupRoleEdge {
    type Left = GroupId;
    type Right = RoleId;
    const KIND: EdgeKind = EdgeKind::GroupRole;
}

impl Edge for RolePermissionEdge {
    type Left = RoleId;
    type Right = PermissionId;
    const KIND: EdgeKind = EdgeKind::RolePermission;
}
