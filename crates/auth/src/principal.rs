use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use gatekeep_core::UserId;

/// A single granted authority string.
///
/// Role authorities carry the `ROLE_` prefix and an upper-cased role name;
/// permission authorities are the bare permission name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Authority(String);

impl Authority {
    pub const ROLE_PREFIX: &'static str = "ROLE_";

    pub fn for_role(role_name: &str) -> Self {
        Self(format!("{}{}", Self::ROLE_PREFIX, role_name.to_uppercase()))
    }

    pub fn for_permission(permission_name: &str) -> Self {
        Self(permission_name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_role(&self) -> bool {
        self.0.starts_with(Self::ROLE_PREFIX)
    }
}

impl core::fmt::Display for Authority {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An authenticated identity with the authorities resolved for this request.
///
/// Built fresh per request from live storage; passed explicitly into every
/// operation that needs to know who the actor is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: UserId,
    pub email: String,
    pub authorities: BTreeSet<Authority>,
}

impl Principal {
    pub fn new(user_id: UserId, email: impl Into<String>, authorities: impl IntoIterator<Item = Authority>) -> Self {
        Self {
            user_id,
            email: email.into(),
            authorities: authorities.into_iter().collect(),
        }
    }

    pub fn has_authority(&self, authority: &Authority) -> bool {
        self.authorities.contains(authority)
    }

    pub fn is_admin(&self) -> bool {
        self.has_authority(&crate::RoleName::ADMIN.authority())
    }

    /// Role authorities only (`ROLE_*`), sorted.
    pub fn role_authorities(&self) -> Vec<&str> {
        self.authorities
            .iter()
            .filter(|a| a.is_role())
            .map(|a| a.as_str())
            .collect()
    }
}
