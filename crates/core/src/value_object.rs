//! Value objects: equality by value, not identity.
//!
//! Natural keys (emails, entity names) keep the casing they were given but are
//! compared case-insensitively. Both types expose that comparison form as
//! [`Email::key`] / [`EntityName::key`], which is what uniqueness is checked on.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Minimum accepted password length for registration and password changes.
pub const MIN_PASSWORD_LEN: usize = 6;

/// A syntactically valid email address (stored casing preserved).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Validate the shape of an email address.
    ///
    /// Accepts `local@domain.tld`: exactly one `@`, a non-empty local part and a
    /// dotted domain without empty labels. No whitespace anywhere.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DomainError::invalid_argument("email must not be empty"));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(DomainError::invalid_argument("email must not contain whitespace"));
        }

        let mut parts = raw.split('@');
        let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
            (Some(local), Some(domain), None) => (local, domain),
            _ => return Err(DomainError::invalid_argument("email must contain exactly one '@'")),
        };

        if local.is_empty() {
            return Err(DomainError::invalid_argument("email local part is empty"));
        }
        if !domain.contains('.') || domain.split('.').any(str::is_empty) {
            return Err(DomainError::invalid_argument("email domain is malformed"));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison key.
    pub fn key(&self) -> String {
        self.0.to_lowercase()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl PartialEq for Email {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Email {}

impl ValueObject for Email {}

impl core::fmt::Display for Email {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A non-blank role, group, or permission name (trimmed, casing preserved).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityName(String);

impl EntityName {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_argument("name must not be blank"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison key.
    pub fn key(&self) -> String {
        self.0.to_lowercase()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl PartialEq for EntityName {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for EntityName {}

impl ValueObject for EntityName {}

impl core::fmt::Display for EntityName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate a raw password against the minimum length policy.
pub fn check_password_policy(raw: &str) -> DomainResult<()> {
    if raw.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::invalid_argument(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}
