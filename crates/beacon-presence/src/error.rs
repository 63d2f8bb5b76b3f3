//! Error types for the presence layer.

use beacon_protocol::IdentityId;
use beacon_transport::ConnectionId;

/// Errors that can occur while updating presence.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    /// The connection is already bound to a different identity. It must
    /// be released from that identity first.
    #[error("{0} is already bound to identity {1}")]
    AlreadyClaimed(ConnectionId, IdentityId),
}
