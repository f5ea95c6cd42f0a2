//! API-side access guards.
//!
//! Handlers call these before touching any service; the middleware never
//! rejects a request on its own.

use gatekeep_auth::{AuthzError, Principal, require_admin as require_admin_authority};

use crate::app::errors;
use crate::context::RequestPrincipal;

/// Any authenticated principal.
pub fn require_authenticated(ctx: &RequestPrincipal) -> Result<&Principal, axum::response::Response> {
    ctx.principal()
        .ok_or_else(|| errors::authz_error_to_response(AuthzError::Unauthenticated))
}

/// A principal holding `ROLE_ADMIN`.
pub fn require_admin(ctx: &RequestPrincipal) -> Result<&Principal, axum::response::Response> {
    require_admin_authority(ctx.principal()).map_err(errors::authz_error_to_response)
}
