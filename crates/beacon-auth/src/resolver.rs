//! Credential resolvers: turn a credential into an identity.
//!
//! A resolver has three possible outcomes, mapped onto
//! `Result<Option<Identity>, AuthError>`:
//!
//! - `Ok(Some(identity))`: the credential proves this identity
//! - `Ok(None)`: the credential resolves to nothing; carry on
//!   unauthenticated
//! - `Err(_)`: the credential is malformed, or the store failed
//!
//! Resolvers hold no mutable state, so one instance serves every
//! connection concurrently.

use std::future::Future;
use std::time::{Duration, SystemTime};

use beacon_protocol::{AccessScope, Identity};

use crate::{AuthConfig, AuthError, SessionStore, TokenRecord, TokenStore};

/// Longest credential accepted before it is treated as malformed.
const MAX_CREDENTIAL_LEN: usize = 4096;

/// Resolves an opaque credential to an identity.
///
/// # Example
///
/// ```rust
/// use beacon_auth::{AuthError, CredentialResolver};
/// use beacon_protocol::Identity;
///
/// /// Treats the credential as the identity id. Development only.
/// struct TrustingResolver;
///
/// impl CredentialResolver for TrustingResolver {
///     async fn resolve(
///         &self,
///         credential: &str,
///     ) -> Result<Option<Identity>, AuthError> {
///         Ok(Some(Identity::new(credential)))
///     }
/// }
/// ```
pub trait CredentialResolver: Send + Sync + 'static {
    fn resolve(
        &self,
        credential: &str,
    ) -> impl Future<Output = Result<Option<Identity>, AuthError>> + Send;
}

/// Rejects credentials no store could ever hold.
fn check_shape(credential: &str) -> Result<(), AuthError> {
    if credential.is_empty() {
        return Err(AuthError::CredentialInvalid("empty".into()));
    }
    if credential.len() > MAX_CREDENTIAL_LEN {
        return Err(AuthError::CredentialInvalid("too long".into()));
    }
    if credential
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(AuthError::CredentialInvalid(
            "contains whitespace or control characters".into(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// TokenResolver
// ---------------------------------------------------------------------------

/// Resolves bearer tokens through a [`TokenStore`].
///
/// A token resolves when its record exists, has not been revoked, and is
/// younger than the validity window. The owning identity is returned with
/// the `all` access scope.
#[derive(Debug)]
pub struct TokenResolver<S> {
    store: S,
    validity: Duration,
    load_roles: bool,
}

impl<S: TokenStore> TokenResolver<S> {
    pub fn new(store: S, config: &AuthConfig) -> Self {
        Self {
            store,
            validity: config.token_validity(),
            load_roles: config.load_roles,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Checks a record against revocation and the validity window.
    fn check_record(
        &self,
        record: &TokenRecord,
        now: SystemTime,
    ) -> Result<(), AuthError> {
        if !record.is_valid {
            return Err(AuthError::CredentialInvalid("revoked".into()));
        }
        // A record stamped in the future (clock skew) counts as fresh.
        let age = now.duration_since(record.issued_at).unwrap_or_default();
        if age > self.validity {
            return Err(AuthError::CredentialExpired);
        }
        Ok(())
    }
}

impl<S: TokenStore> CredentialResolver for TokenResolver<S> {
    async fn resolve(
        &self,
        credential: &str,
    ) -> Result<Option<Identity>, AuthError> {
        check_shape(credential)?;

        let Some(record) = self.store.find_token(credential).await? else {
            tracing::debug!("token not found");
            return Ok(None);
        };

        if let Err(e) = self.check_record(&record, SystemTime::now()) {
            tracing::debug!(owner = %record.owner, error = %e, "token rejected");
            return Ok(None);
        }

        let identity = self
            .store
            .find_identity(&record.owner, self.load_roles)
            .await?;
        if identity.is_none() {
            tracing::debug!(owner = %record.owner, "token owner not found");
        }
        Ok(identity.map(|identity| identity.with_scope(AccessScope::all())))
    }
}

// ---------------------------------------------------------------------------
// SessionResolver
// ---------------------------------------------------------------------------

/// Resolves session references through a [`SessionStore`].
///
/// No expiry check here: the session store decides whether a session is
/// still alive.
#[derive(Debug)]
pub struct SessionResolver<S> {
    store: S,
}

impl<S: SessionStore> SessionResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: SessionStore> CredentialResolver for SessionResolver<S> {
    async fn resolve(
        &self,
        credential: &str,
    ) -> Result<Option<Identity>, AuthError> {
        check_shape(credential)?;

        let identity = self.store.find_principal(credential).await?;
        if identity.is_none() {
            tracing::debug!("session reference not found");
        }
        Ok(identity)
    }
}
