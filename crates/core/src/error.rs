//! Domain error model.

use thiserror::Error;

use crate::entity::EntityKind;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every failure that crosses a service boundary is one of these kinds.
/// Storage failures are translated into them at the write site; the HTTP
/// layer maps each kind onto exactly one status class.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed, empty or contradictory input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced entities do not exist. `ids` enumerates every missing one.
    #[error("{kind} not found: {}", .ids.join(", "))]
    NotFound { kind: EntityKind, ids: Vec<String> },

    /// Optimistic version mismatch or an unrecoverable write race.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A natural key (email / name) is already taken.
    #[error("duplicate resource: {0}")]
    DuplicateResource(String),

    /// Bad login, malformed registration input, or missing authentication.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Authentication attempted against a disabled account.
    #[error("user is disabled")]
    UserDisabled,

    /// Authenticated, but lacking the required authority.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The backing store is unreachable; safe to retry.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Unclassified failure. Details are logged, never returned.
    #[error("internal error")]
    Internal,
}

impl DomainError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found<I, T>(kind: EntityKind, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        let mut ids: Vec<String> = ids.into_iter().map(|id| id.to_string()).collect();
        ids.sort();
        Self::NotFound { kind, ids }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn duplicate(msg: impl Into<String>) -> Self {
        Self::DuplicateResource(msg.into())
    }

    pub fn invalid_credentials(msg: impl Into<String>) -> Self {
        Self::InvalidCredentials(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_lists_every_missing_id_sorted() {
        let err = DomainError::not_found(EntityKind::Role, ["b", "a"]);
        assert_eq!(err.to_string(), "role not found: a, b");
    }

    #[test]
    fn internal_does_not_leak_details() {
        assert_eq!(DomainError::Internal.to_string(), "internal error");
    }
}
