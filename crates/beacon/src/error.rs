//! Unified error type for the gateway.

use beacon_auth::AuthError;
use beacon_presence::PresenceError;
use beacon_protocol::ProtocolError;
use beacon_room::RoomError;
use beacon_transport::TransportError;

/// Top-level error that wraps every layer's error.
///
/// The `#[from]` impls let `?` lift sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Credential resolution failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A room operation failed.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// Presence bookkeeping refused a bind.
    #[error(transparent)]
    Presence(#[from] PresenceError),

    /// The handshake carried a malformed credential and the gateway is
    /// configured to refuse such connections.
    #[error("handshake rejected: {0}")]
    Rejected(#[source] AuthError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_transport::ConnectionId;

    #[test]
    fn test_from_transport_error() {
        let err: GatewayError =
            TransportError::ConnectionClosed("gone".into()).into();
        assert!(matches!(err, GatewayError::Transport(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: GatewayError =
            ProtocolError::InvalidMessage("bad".into()).into();
        assert!(matches!(err, GatewayError::Protocol(_)));
    }

    #[test]
    fn test_from_auth_error() {
        let err: GatewayError = AuthError::CredentialExpired.into();
        assert!(matches!(err, GatewayError::Auth(_)));
    }

    #[test]
    fn test_from_room_error() {
        let err: GatewayError =
            RoomError::NotAttached(ConnectionId::new(3)).into();
        assert!(matches!(err, GatewayError::Room(_)));
        assert!(err.to_string().contains("conn-3"));
    }

    #[test]
    fn test_rejected_keeps_source() {
        use std::error::Error;
        let err = GatewayError::Rejected(AuthError::CredentialInvalid(
            "whitespace".into(),
        ));
        assert_eq!(
            err.to_string(),
            "handshake rejected: credential invalid: whitespace"
        );
        assert!(err.source().is_some());
    }
}
