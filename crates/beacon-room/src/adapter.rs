//! Cross-process replication hook.
//!
//! A gateway running alone keeps rooms in memory. Several gateways behind
//! a load balancer need a shared bus so that a broadcast on one reaches
//! members connected to another. [`BroadcastAdapter`] is the seam: the
//! room table reports every join, leave, and broadcast to it, and
//! messages arriving from the bus come back in through
//! [`RoomTable::deliver_remote`](crate::RoomTable::deliver_remote).
//!
//! Adapter calls happen under the gateway's registry lock, so they must
//! not block. Queue the work and return.

use std::collections::BTreeMap;

use beacon_protocol::{RoomName, ServerMessage};
use beacon_transport::ConnectionId;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::RoomError;

/// Where an external adapter connects.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AdapterConfig {
    /// Adapter name, e.g. `"redis"`.
    pub name: String,
    /// Backend-specific connection options (url, prefix, ...).
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Replicates room traffic to other gateway instances.
pub trait BroadcastAdapter: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// A local connection joined a room.
    fn joined(
        &self,
        _room: &RoomName,
        _conn_id: ConnectionId,
    ) -> Result<(), RoomError> {
        Ok(())
    }

    /// A local connection left a room.
    fn left(
        &self,
        _room: &RoomName,
        _conn_id: ConnectionId,
    ) -> Result<(), RoomError> {
        Ok(())
    }

    /// A broadcast was issued locally.
    fn publish(
        &self,
        room: &RoomName,
        msg: &ServerMessage,
        exclude: Option<ConnectionId>,
    ) -> Result<(), RoomError>;
}

/// Replication traffic produced by a [`ChannelAdapter`].
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    Joined {
        room: RoomName,
        conn_id: ConnectionId,
    },
    Left {
        room: RoomName,
        conn_id: ConnectionId,
    },
    Published {
        room: RoomName,
        msg: ServerMessage,
        exclude: Option<ConnectionId>,
    },
}

/// An adapter that pushes replication traffic into an unbounded channel.
///
/// A bus task owns the receiving end and forwards to the real backend.
pub struct ChannelAdapter {
    name: String,
    tx: mpsc::UnboundedSender<AdapterEvent>,
}

impl ChannelAdapter {
    pub fn new(
        name: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<AdapterEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                name: name.into(),
                tx,
            },
            rx,
        )
    }

    /// Builds an adapter named after a configured endpoint.
    pub fn from_config(
        config: &AdapterConfig,
    ) -> (Self, mpsc::UnboundedReceiver<AdapterEvent>) {
        Self::new(config.name.clone())
    }

    fn forward(&self, event: AdapterEvent) -> Result<(), RoomError> {
        self.tx.send(event).map_err(|_| RoomError::Adapter {
            adapter: self.name.clone(),
            reason: "bus task stopped".into(),
        })
    }
}

impl BroadcastAdapter for ChannelAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn joined(
        &self,
        room: &RoomName,
        conn_id: ConnectionId,
    ) -> Result<(), RoomError> {
        self.forward(AdapterEvent::Joined {
            room: room.clone(),
            conn_id,
        })
    }

    fn left(
        &self,
        room: &RoomName,
        conn_id: ConnectionId,
    ) -> Result<(), RoomError> {
        self.forward(AdapterEvent::Left {
            room: room.clone(),
            conn_id,
        })
    }

    fn publish(
        &self,
        room: &RoomName,
        msg: &ServerMessage,
        exclude: Option<ConnectionId>,
    ) -> Result<(), RoomError> {
        self.forward(AdapterEvent::Published {
            room: room.clone(),
            msg: msg.clone(),
            exclude,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_config_options_default_to_empty() {
        let config: AdapterConfig =
            serde_json::from_str(r#"{"name": "redis"}"#).unwrap();
        assert_eq!(config.name, "redis");
        assert!(config.options.is_empty());
    }

    #[test]
    fn test_channel_adapter_reports_stopped_bus() {
        let (adapter, rx) = ChannelAdapter::new("bus");
        drop(rx);

        let result = adapter.joined(&RoomName::public(), ConnectionId::new(1));
        assert!(matches!(result, Err(RoomError::Adapter { .. })));
    }
}
