use thiserror::Error;

use crate::{Authority, Principal, RoleName};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("forbidden: missing authority '{0}'")]
    Forbidden(String),
}

/// Authorize a (possibly anonymous) principal against a required authority.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
///
/// An invalid or absent token upstream yields `None` here, so the decision of
/// "anonymous is not allowed" is made at this point and nowhere earlier.
pub fn authorize<'p>(principal: Option<&'p Principal>, required: &Authority) -> Result<&'p Principal, AuthzError> {
    let principal = principal.ok_or(AuthzError::Unauthenticated)?;
    if principal.has_authority(required) {
        Ok(principal)
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Shorthand for the `ROLE_ADMIN` guard on administrative operations.
pub fn require_admin(principal: Option<&Principal>) -> Result<&Principal, AuthzError> {
    authorize(principal, &RoleName::ADMIN.authority())
}
