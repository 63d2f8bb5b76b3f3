//! Identity and room vocabulary shared by every layer.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the room every connection joins for system-wide calls.
pub const GLOBAL_ROOM: &str = "global";

/// Name of the room every connection joins for public traffic.
pub const PUBLIC_ROOM: &str = "public";

/// Prefix of the per-identity exclusive room (`identity_<id>`).
pub const IDENTITY_ROOM_PREFIX: &str = "identity_";

// ---------------------------------------------------------------------------
// IdentityId
// ---------------------------------------------------------------------------

/// Identifier of a resolved principal.
///
/// Credential stores hand out whatever ids they like (numeric database
/// keys, UUIDs, usernames), so this wraps a string. Serializes as the
/// bare string.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<u64> for IdentityId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

// ---------------------------------------------------------------------------
// AccessScope
// ---------------------------------------------------------------------------

/// The access scope a resolver grants along with an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessScope(String);

impl AccessScope {
    /// Scope granted by bearer tokens: unrestricted.
    pub fn all() -> Self {
        Self("all".to_string())
    }

    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A resolved principal, as returned by a credential resolver.
///
/// Once attached to a connection it is never mutated; re-authentication
/// replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,

    /// Role names. Empty when the resolver was configured not to load them.
    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<AccessScope>,

    /// Any other fields the credential store returned.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Identity {
    /// Creates an identity with no roles, scope, or attributes.
    pub fn new(id: impl Into<IdentityId>) -> Self {
        Self {
            id: id.into(),
            roles: Vec::new(),
            scope: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_scope(mut self, scope: AccessScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

// ---------------------------------------------------------------------------
// RoomName
// ---------------------------------------------------------------------------

/// Name of a broadcast group.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomName(String);

impl RoomName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The system-wide room.
    pub fn global() -> Self {
        Self::new(GLOBAL_ROOM)
    }

    /// The public room.
    pub fn public() -> Self {
        Self::new(PUBLIC_ROOM)
    }

    /// The exclusive room of one identity, `identity_<id>`.
    pub fn for_identity(id: &IdentityId) -> Self {
        Self(format!("{IDENTITY_ROOM_PREFIX}{id}"))
    }

    /// Returns `true` for `identity_<id>` rooms.
    pub fn is_identity_room(&self) -> bool {
        self.0.starts_with(IDENTITY_ROOM_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_room_name_uses_prefix() {
        let room = RoomName::for_identity(&IdentityId::new("u1"));
        assert_eq!(room.as_str(), "identity_u1");
        assert!(room.is_identity_room());
        assert!(!RoomName::public().is_identity_room());
    }

    #[test]
    fn test_identity_id_serializes_as_bare_string() {
        let json = serde_json::to_string(&IdentityId::from(42)).unwrap();
        assert_eq!(json, r#""42""#);
    }

    #[test]
    fn test_identity_omits_empty_optional_fields() {
        let json = serde_json::to_value(Identity::new("u1")).unwrap();
        assert_eq!(json, serde_json::json!({"id": "u1", "roles": []}));
    }

    #[test]
    fn test_identity_deserializes_with_defaults() {
        let identity: Identity =
            serde_json::from_str(r#"{"id":"u9"}"#).unwrap();
        assert_eq!(identity.id, IdentityId::new("u9"));
        assert!(identity.roles.is_empty());
        assert!(identity.scope.is_none());
    }

    #[test]
    fn test_has_role() {
        let identity = Identity::new("u1").with_roles(["admin", "editor"]);
        assert!(identity.has_role("admin"));
        assert!(!identity.has_role("owner"));
    }
}
