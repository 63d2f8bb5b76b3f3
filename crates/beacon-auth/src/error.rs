//! Error types for the auth layer.

/// A credential store lookup failed (I/O, timeout, bad row).
///
/// Stores wrap whatever their backend reports into this; the resolver
/// surfaces it as [`AuthError::ResolverUnavailable`].
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors that can occur while resolving a credential.
///
/// Only [`ResolverUnavailable`](Self::ResolverUnavailable) and
/// [`CredentialInvalid`](Self::CredentialInvalid) for a malformed value
/// ever leave a resolver. Unknown, revoked, and expired credentials are
/// reported as "absent" (`Ok(None)`), and the variants below are what the
/// resolver logs for them.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The credential is malformed, unknown, or revoked.
    #[error("credential invalid: {0}")]
    CredentialInvalid(String),

    /// The token is older than the configured validity window.
    #[error("credential expired")]
    CredentialExpired,

    /// The credential store could not be reached.
    #[error("resolver unavailable: {0}")]
    ResolverUnavailable(#[from] StoreError),
}

impl AuthError {
    /// Returns `true` when the failure came from the credential's shape
    /// rather than from the store.
    ///
    /// The gateway may reject a handshake for these.
    pub fn is_malformed_credential(&self) -> bool {
        matches!(self, Self::CredentialInvalid(_))
    }
}
