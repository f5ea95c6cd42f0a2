use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::principal::Authority;

/// Role name as seen by the authorization layer.
///
/// Roles are opaque strings here; which permissions a role carries is decided
/// by the role → permission edges in storage.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleName(Cow<'static, str>);

impl RoleName {
    /// Role every self-registered user receives.
    pub const MEMBER: RoleName = RoleName(Cow::Borrowed("MEMBER"));

    /// Role guarding the administrative surface.
    pub const ADMIN: RoleName = RoleName(Cow::Borrowed("ADMIN"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `ROLE_<NAME>` authority this role grants.
    pub fn authority(&self) -> Authority {
        Authority::for_role(self.as_str())
    }
}

impl core::fmt::Display for RoleName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
