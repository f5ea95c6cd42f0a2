//! `gatekeep-auth`: pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: it knows how to
//! sign and verify tokens, hash and verify passwords, and decide whether a
//! principal holds an authority. Who the principal is comes from elsewhere.

pub mod authorize;
pub mod claims;
pub mod password;
pub mod principal;
pub mod roles;
pub mod token;

pub use authorize::{authorize, require_admin, AuthzError};
pub use claims::{validate_claims, TokenClaims, TokenValidationError};
pub use password::{Argon2PasswordHasher, PasswordError, PasswordHasher};
pub use principal::{Authority, Principal};
pub use roles::RoleName;
pub use token::{Hs256TokenSigner, TokenError, TokenSigner};
