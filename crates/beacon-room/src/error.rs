//! Error types for the room layer.

use beacon_transport::ConnectionId;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The connection has no outbound channel registered with the table.
    #[error("{0} is not attached")]
    NotAttached(ConnectionId),

    /// The broadcast adapter could not replicate an operation.
    #[error("adapter {adapter} failed: {reason}")]
    Adapter { adapter: String, reason: String },
}
