//! The credential-store boundary.
//!
//! The gateway never talks to a database itself. An application hands it
//! a [`TokenStore`] and, optionally, a [`SessionStore`]; those do the
//! lookups. The in-memory implementations here back the demo binary and
//! the tests.

use std::collections::HashMap;
use std::future::Future;
use std::time::SystemTime;

use beacon_protocol::{Identity, IdentityId};
use tokio::sync::RwLock;

use crate::StoreError;

/// A stored bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    /// The token value itself.
    pub token: String,
    /// The identity the token was issued to.
    pub owner: IdentityId,
    /// When the token was issued (or last refreshed). Expiry is measured
    /// from here.
    pub issued_at: SystemTime,
    /// `false` once the token has been revoked.
    pub is_valid: bool,
}

impl TokenRecord {
    /// A valid token issued now.
    pub fn new(token: impl Into<String>, owner: impl Into<IdentityId>) -> Self {
        Self {
            token: token.into(),
            owner: owner.into(),
            issued_at: SystemTime::now(),
            is_valid: true,
        }
    }

    pub fn issued_at(mut self, at: SystemTime) -> Self {
        self.issued_at = at;
        self
    }

    pub fn revoked(mut self) -> Self {
        self.is_valid = false;
        self
    }
}

/// Token and identity lookups used by the token resolver.
///
/// `Ok(None)` means "no such row". `Err` means the lookup itself failed.
pub trait TokenStore: Send + Sync + 'static {
    /// Finds a token record by its value.
    fn find_token(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Option<TokenRecord>, StoreError>> + Send;

    /// Finds an identity by id, optionally with its roles.
    fn find_identity(
        &self,
        id: &IdentityId,
        load_roles: bool,
    ) -> impl Future<Output = Result<Option<Identity>, StoreError>> + Send;
}

/// Session-principal lookup used by the session resolver.
///
/// Expiry of the session itself is the store's business.
pub trait SessionStore: Send + Sync + 'static {
    /// Finds the identity a session reference belongs to.
    fn find_principal(
        &self,
        session_ref: &str,
    ) -> impl Future<Output = Result<Option<Identity>, StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// In-memory stores
// ---------------------------------------------------------------------------

/// A [`TokenStore`] held in memory.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<String, TokenRecord>>,
    identities: RwLock<HashMap<IdentityId, Identity>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) an identity.
    pub async fn insert_identity(&self, identity: Identity) {
        self.identities
            .write()
            .await
            .insert(identity.id.clone(), identity);
    }

    /// Adds (or replaces) a token record.
    pub async fn insert_token(&self, record: TokenRecord) {
        self.tokens
            .write()
            .await
            .insert(record.token.clone(), record);
    }

    /// Marks a token as revoked. Returns `false` if it wasn't stored.
    pub async fn revoke(&self, token: &str) -> bool {
        match self.tokens.write().await.get_mut(token) {
            Some(record) => {
                record.is_valid = false;
                true
            }
            None => false,
        }
    }
}

impl TokenStore for MemoryTokenStore {
    async fn find_token(
        &self,
        token: &str,
    ) -> Result<Option<TokenRecord>, StoreError> {
        Ok(self.tokens.read().await.get(token).cloned())
    }

    async fn find_identity(
        &self,
        id: &IdentityId,
        load_roles: bool,
    ) -> Result<Option<Identity>, StoreError> {
        let identity = self.identities.read().await.get(id).cloned();
        Ok(identity.map(|mut identity| {
            if !load_roles {
                identity.roles.clear();
            }
            identity
        }))
    }
}

/// A [`SessionStore`] held in memory.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Identity>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a session reference to an identity.
    pub async fn insert(&self, session_ref: impl Into<String>, identity: Identity) {
        self.sessions
            .write()
            .await
            .insert(session_ref.into(), identity);
    }

    /// Drops a session. Returns `false` if it wasn't stored.
    pub async fn remove(&self, session_ref: &str) -> bool {
        self.sessions.write().await.remove(session_ref).is_some()
    }
}

impl SessionStore for MemorySessionStore {
    async fn find_principal(
        &self,
        session_ref: &str,
    ) -> Result<Option<Identity>, StoreError> {
        Ok(self.sessions.read().await.get(session_ref).cloned())
    }
}
