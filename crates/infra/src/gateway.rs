//! Authentication gateway: login, registration, and per-request principal resolution.
//!
//! Stateless: every call is one decision against live storage. Tokens only
//! carry identity (`sub` = email) and a validity window; authorities are
//! re-resolved on every request so revocations apply immediately.

use std::sync::{Arc, OnceLock};

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use gatekeep_auth::{Authority, PasswordError, PasswordHasher, Principal, RoleName, TokenClaims, TokenSigner};
use gatekeep_core::{
    DomainError, DomainResult, Email, EntityName, RoleId, User, UserId, UserRoleEdge, check_password_policy,
};

use crate::directory::get_or_create_in;
use crate::reconciler::assign_in;
use crate::resolver::{permissions_in, role_names_in};
use crate::store::{RbacStore, StoreError};

const BAD_LOGIN: &str = "invalid email or password";

/// Verified against on an unknown email so both login failures cost one hash check.
const DECOY_PASSWORD: &str = "decoy-password-for-unknown-accounts";

/// Hashing failures are infrastructure faults, never a credential mismatch.
pub(crate) fn password_failure(err: PasswordError) -> DomainError {
    error!(error = %err, "password hashing failed");
    DomainError::Internal
}

/// Registration reports malformed input as `InvalidCredentials`, the same kind
/// as a failed login.
fn as_credentials_error(err: DomainError) -> DomainError {
    match err {
        DomainError::InvalidArgument(msg) => DomainError::InvalidCredentials(msg),
        other => other,
    }
}

/// Result of a successful login or registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub token: String,
    pub user_id: UserId,
    pub roles: Vec<String>,
}

pub struct AuthGateway<S> {
    store: S,
    hasher: Arc<dyn PasswordHasher>,
    signer: Arc<dyn TokenSigner>,
    token_ttl: Duration,
    decoy_hash: OnceLock<String>,
}

impl<S: RbacStore> AuthGateway<S> {
    pub fn new(store: S, hasher: Arc<dyn PasswordHasher>, signer: Arc<dyn TokenSigner>, token_ttl: Duration) -> Self {
        Self {
            store,
            hasher,
            signer,
            token_ttl,
            decoy_hash: OnceLock::new(),
        }
    }

    /// Hash of [`DECOY_PASSWORD`] under the configured hasher, computed once.
    fn decoy_hash(&self) -> DomainResult<&str> {
        if let Some(hash) = self.decoy_hash.get() {
            return Ok(hash);
        }
        let hash = self.hasher.hash(DECOY_PASSWORD).map_err(password_failure)?;
        Ok(self.decoy_hash.get_or_init(|| hash))
    }

    /// Check credentials and issue a token.
    ///
    /// Unknown email and wrong password are indistinguishable. A disabled
    /// account fails with `UserDisabled`; an account without any directly
    /// assigned role cannot log in.
    pub async fn login(&self, raw_email: &str, raw_password: &str) -> DomainResult<AuthSession> {
        let email = Email::parse(raw_email).map_err(|_| DomainError::invalid_credentials(BAD_LOGIN))?;

        let mut tx = self.store.begin().await?;
        let Some(user) = tx.find_user_by_email(&email.key()).await? else {
            self.hasher
                .verify(raw_password, self.decoy_hash()?)
                .map_err(password_failure)?;
            return Err(DomainError::invalid_credentials(BAD_LOGIN));
        };

        let matches = self
            .hasher
            .verify(raw_password, &user.password_hash)
            .map_err(password_failure)?;
        if !matches {
            return Err(DomainError::invalid_credentials(BAD_LOGIN));
        }
        if !user.enabled {
            return Err(DomainError::UserDisabled);
        }

        let roles = role_names_in(tx.as_mut(), user.id).await?;
        tx.rollback().await?;
        if roles.is_empty() {
            return Err(DomainError::invalid_credentials("no assigned roles"));
        }

        let session = self.issue(&user, roles)?;
        info!(user_id = %user.id, "login succeeded");
        Ok(session)
    }

    /// Create an account holding the `MEMBER` role and issue a token.
    ///
    /// The very first account in an empty system is created enabled; every
    /// later one starts disabled until an administrator enables it.
    pub async fn register(&self, raw_email: &str, raw_password: &str) -> DomainResult<AuthSession> {
        let email = Email::parse(raw_email).map_err(as_credentials_error)?;
        check_password_policy(raw_password).map_err(as_credentials_error)?;
        let password_hash = self.hasher.hash(raw_password).map_err(password_failure)?;
        let member = EntityName::parse(RoleName::MEMBER.as_str())?;

        let mut tx = self.store.begin().await?;
        if tx.find_user_by_email(&email.key()).await?.is_some() {
            return Err(DomainError::duplicate("email already in use"));
        }

        let enabled = tx.count_users().await? == 0;
        let user = User::new(email.into_inner(), password_hash, enabled);
        match tx.insert_user(&user).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation(_)) => return Err(DomainError::duplicate("email already in use")),
            Err(other) => return Err(other.into()),
        }

        let member_role = get_or_create_in::<RoleId>(tx.as_mut(), &member).await?;
        assign_in::<UserRoleEdge>(tx.as_mut(), &[user.id], &[member_role.id]).await?;
        let roles = role_names_in(tx.as_mut(), user.id).await?;
        tx.commit().await?;

        info!(user_id = %user.id, enabled, "user registered");
        self.issue(&user, roles)
    }

    /// Resolve the principal behind a bearer token.
    ///
    /// Never fails: an invalid, expired or malformed token, an unknown subject,
    /// or a disabled account all yield `None` (anonymous).
    pub async fn authenticate_from_token(&self, token: &str) -> Option<Principal> {
        let claims = match self.signer.verify(token, Utc::now()) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, "bearer token rejected");
                return None;
            }
        };

        match self.principal_for(&claims.sub).await {
            Ok(principal) => principal,
            Err(e) => {
                warn!(error = %e, "could not resolve principal; treating request as anonymous");
                None
            }
        }
    }

    async fn principal_for(&self, subject: &str) -> DomainResult<Option<Principal>> {
        let mut tx = self.store.begin().await?;
        let Some(user) = tx.find_user_by_email(&subject.to_lowercase()).await? else {
            debug!("token subject no longer exists");
            return Ok(None);
        };
        if !user.enabled {
            debug!(user_id = %user.id, "token subject is disabled");
            return Ok(None);
        }

        let roles = role_names_in(tx.as_mut(), user.id).await?;
        let permissions = permissions_in(tx.as_mut(), user.id).await?;
        tx.rollback().await?;

        let authorities = roles
            .iter()
            .map(|role| Authority::for_role(role))
            .chain(permissions.iter().map(|p| Authority::for_permission(p)));
        Ok(Some(Principal::new(user.id, user.email, authorities)))
    }

    fn issue(&self, user: &User, roles: Vec<String>) -> DomainResult<AuthSession> {
        let claims = TokenClaims::new(user.email.clone(), roles.clone(), Utc::now(), self.token_ttl);
        let token = self.signer.sign(&claims).map_err(|e| {
            error!(error = %e, "token signing failed");
            DomainError::Internal
        })?;
        Ok(AuthSession {
            token,
            user_id: user.id,
            roles,
        })
    }
}
