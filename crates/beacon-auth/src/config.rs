//! Auth configuration.

use std::time::Duration;

use serde::Deserialize;

/// Controls how credentials are resolved.
///
/// Every field has a default, so a partial config section deserializes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// How long (in seconds) a token stays valid after it was issued.
    ///
    /// Default: 3600.
    pub token_validity_secs: u64,

    /// Whether the session-reference stage runs after the token stage.
    pub session_enabled: bool,

    /// Whether token lookups load the owning identity's roles.
    pub load_roles: bool,

    /// Whether a handshake carrying a malformed credential is rejected
    /// outright. When `false` the connection proceeds unauthenticated.
    pub reject_malformed_handshake: bool,
}

impl AuthConfig {
    pub fn token_validity(&self) -> Duration {
        Duration::from_secs(self.token_validity_secs)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_validity_secs: 3600,
            session_enabled: true,
            load_roles: true,
            reject_malformed_handshake: false,
        }
    }
}
