//! Entity records.
//!
//! Entities reference each other only by ID; relationships live in the edge
//! sets and are queried on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{GroupId, PermissionId, RoleId, UserId};

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub enabled: bool,
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>, enabled: bool) -> Self {
        Self {
            id: UserId::new(),
            email: email.into(),
            password_hash: password_hash.into(),
            enabled,
            version: 0,
            created_at: Utc::now(),
        }
    }
}

/// A uniquely named entity (role, group, permission).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Named<I> {
    pub id: I,
    pub name: String,
    pub version: u64,
}

pub type Role = Named<RoleId>;
pub type Group = Named<GroupId>;
pub type Permission = Named<PermissionId>;
