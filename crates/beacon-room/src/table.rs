//! The room table: membership sets and delivery.
//!
//! # Concurrency note
//!
//! Like the presence registry, `RoomTable` is a plain data structure.
//! The gateway keeps it behind its registry lock, which is what makes a
//! connection's room joins visible to broadcasts before its
//! `authenticated` event fires.

use std::collections::{HashMap, HashSet};

use beacon_protocol::{RoomName, ServerMessage};
use beacon_transport::ConnectionId;
use tokio::sync::mpsc;

use crate::{BroadcastAdapter, RoomError};

/// Channel delivering server messages to one connection's handler task.
pub type OutboundSender = mpsc::UnboundedSender<ServerMessage>;

/// Rooms, their members, and where to deliver to each member.
///
/// Rooms exist only while they have members: the first join creates one
/// and the last leave drops it.
#[derive(Default)]
pub struct RoomTable {
    /// Members of each non-empty room.
    rooms: HashMap<RoomName, HashSet<ConnectionId>>,

    /// Reverse index: rooms each connection is in.
    memberships: HashMap<ConnectionId, HashSet<RoomName>>,

    /// Outbound channel per attached connection.
    senders: HashMap<ConnectionId, OutboundSender>,

    adapter: Option<Box<dyn BroadcastAdapter>>,
}

impl RoomTable {
    /// Creates an empty, process-local table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table that replicates through `adapter`.
    pub fn with_adapter(adapter: Box<dyn BroadcastAdapter>) -> Self {
        Self {
            adapter: Some(adapter),
            ..Self::default()
        }
    }

    pub fn adapter_name(&self) -> Option<&str> {
        self.adapter.as_deref().map(|a| a.name())
    }

    /// Registers a connection's outbound channel.
    pub fn attach(&mut self, conn_id: ConnectionId, sender: OutboundSender) {
        self.senders.insert(conn_id, sender);
    }

    /// Removes a connection from every room and drops its channel.
    ///
    /// Returns the rooms it was in.
    pub fn detach(&mut self, conn_id: ConnectionId) -> Vec<RoomName> {
        let rooms = self.rooms_of(conn_id);
        for room in &rooms {
            self.leave(conn_id, room);
        }
        self.memberships.remove(&conn_id);
        self.senders.remove(&conn_id);
        rooms
    }

    pub fn is_attached(&self, conn_id: ConnectionId) -> bool {
        self.senders.contains_key(&conn_id)
    }

    /// Adds a connection to a room, creating the room if needed.
    ///
    /// Returns `false` if it was already a member.
    ///
    /// # Errors
    /// Returns [`RoomError::NotAttached`] for a connection with no
    /// outbound channel.
    pub fn join(
        &mut self,
        conn_id: ConnectionId,
        room: &RoomName,
    ) -> Result<bool, RoomError> {
        if !self.is_attached(conn_id) {
            return Err(RoomError::NotAttached(conn_id));
        }
        if !self.rooms.entry(room.clone()).or_default().insert(conn_id) {
            return Ok(false);
        }
        self.memberships
            .entry(conn_id)
            .or_default()
            .insert(room.clone());
        tracing::trace!(%conn_id, %room, "joined room");

        if let Some(adapter) = &self.adapter {
            if let Err(e) = adapter.joined(room, conn_id) {
                tracing::warn!(%room, error = %e, "adapter join failed");
            }
        }
        Ok(true)
    }

    /// Removes a connection from a room. Returns `false` if it wasn't a
    /// member.
    pub fn leave(&mut self, conn_id: ConnectionId, room: &RoomName) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };
        if !members.remove(&conn_id) {
            return false;
        }
        if members.is_empty() {
            self.rooms.remove(room);
        }
        if let Some(rooms) = self.memberships.get_mut(&conn_id) {
            rooms.remove(room);
        }
        tracing::trace!(%conn_id, %room, "left room");

        if let Some(adapter) = &self.adapter {
            if let Err(e) = adapter.left(room, conn_id) {
                tracing::warn!(%room, error = %e, "adapter leave failed");
            }
        }
        true
    }

    pub fn contains(&self, room: &RoomName, conn_id: ConnectionId) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|members| members.contains(&conn_id))
    }

    /// Returns a room's members in ascending id order.
    pub fn members(&self, room: &RoomName) -> Vec<ConnectionId> {
        let mut members: Vec<ConnectionId> = self
            .rooms
            .get(room)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Returns the rooms a connection is in, sorted by name.
    pub fn rooms_of(&self, conn_id: ConnectionId) -> Vec<RoomName> {
        let mut rooms: Vec<RoomName> = self
            .memberships
            .get(&conn_id)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    /// Number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Delivers `msg` to every current member of `room` except
    /// `exclude`, then hands it to the adapter.
    ///
    /// Returns the number of local deliveries.
    pub fn broadcast(
        &self,
        room: &RoomName,
        msg: &ServerMessage,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let delivered = self.deliver_remote(room, msg, exclude);
        if let Some(adapter) = &self.adapter {
            if let Err(e) = adapter.publish(room, msg, exclude) {
                tracing::warn!(%room, error = %e, "adapter publish failed");
            }
        }
        delivered
    }

    /// Delivers a broadcast that arrived from another instance to local
    /// members only. Never re-published.
    pub fn deliver_remote(
        &self,
        room: &RoomName,
        msg: &ServerMessage,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let Some(members) = self.rooms.get(room) else {
            return 0;
        };
        members
            .iter()
            .filter(|conn_id| Some(**conn_id) != exclude)
            .filter(|conn_id| self.send_to(**conn_id, msg.clone()))
            .count()
    }

    /// Delivers `msg` to one connection. Returns `false` if the
    /// connection is unknown or its handler has gone away.
    pub fn send_to(&self, conn_id: ConnectionId, msg: ServerMessage) -> bool {
        match self.senders.get(&conn_id) {
            Some(sender) => sender.send(msg).is_ok(),
            None => false,
        }
    }
}

impl std::fmt::Debug for RoomTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomTable")
            .field("rooms", &self.rooms.len())
            .field("connections", &self.senders.len())
            .field("adapter", &self.adapter_name())
            .finish()
    }
}
