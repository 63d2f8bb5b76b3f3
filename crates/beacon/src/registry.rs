//! The connection registry: live connections, their identities, and the
//! shared room and presence tables.
//!
//! All three tables sit behind one lock, so a connect, a
//! re-authentication, or a disconnect is applied as a single critical
//! section. Lifecycle events are emitted from inside that section, in the
//! order the transitions happened.
//!
//! ```text
//! reserve(c1)                       c1: Reserved
//! connect(c1, tx, Some(u1))         c1: Live{u1}   rooms: global, public, identity_u1
//!                                   → connection-opened, identity-went-online, authenticated
//! disconnect(c1)                    c1: gone       → identity-went-offline, connection-closed
//! ```
//!
//! A connection is reserved before its credentials are resolved. If it
//! disconnects while the lookup is pending, the reservation is cancelled
//! and the late result is discarded by [`ConnectionRegistry::connect`].

use std::collections::HashMap;

use beacon_presence::{EventBus, EventKind, LifecycleEvent, PresenceRegistry};
use beacon_protocol::{Identity, IdentityId, RoomName, ServerMessage};
use beacon_room::{BroadcastAdapter, OutboundSender, RoomTable};
use beacon_transport::ConnectionId;
use tokio::sync::Mutex;

use crate::GatewayError;

/// Result of [`ConnectionRegistry::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The connection is live and joined the default rooms.
    Registered { authenticated: bool },
    /// The connection went away before registration. Nothing was applied.
    Discarded,
}

/// Result of [`ConnectionRegistry::authenticate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// A new identity was bound to the connection.
    Attached,
    /// The connection was already bound to this identity; only the
    /// credential changed.
    Refreshed,
    /// A newer login on the same connection was started after this one.
    Superseded,
    /// The connection is no longer live.
    Discarded,
}

enum Slot {
    /// Credentials are still being resolved.
    Reserved,
    Live(ConnectionEntry),
}

#[derive(Default)]
struct ConnectionEntry {
    identity: Option<Identity>,
    credential: Option<String>,
    /// Bumped by every in-band login, in arrival order.
    login_epoch: u64,
    /// Epoch of the last login whose identity was applied. Failed logins
    /// never advance it, so only successful results compete.
    applied_epoch: u64,
}

struct RegistryState {
    connections: HashMap<ConnectionId, Slot>,
    rooms: RoomTable,
    presence: PresenceRegistry,
    events: EventBus,
}

impl RegistryState {
    fn entry_mut(&mut self, conn_id: ConnectionId) -> Option<&mut ConnectionEntry> {
        match self.connections.get_mut(&conn_id) {
            Some(Slot::Live(entry)) => Some(entry),
            _ => None,
        }
    }

    /// Records the identity, joins its exclusive room, and binds presence.
    fn bind_identity(
        &mut self,
        conn_id: ConnectionId,
        identity: Identity,
        credential: String,
    ) -> Result<(), GatewayError> {
        let identity_id = identity.id.clone();
        if let Some(entry) = self.entry_mut(conn_id) {
            entry.identity = Some(identity);
            entry.credential = Some(credential);
        }
        self.rooms.join(conn_id, &RoomName::for_identity(&identity_id))?;
        self.presence.bind(&identity_id, conn_id)?;

        tracing::info!(%conn_id, %identity_id, "connection authenticated");
        self.events.emit(LifecycleEvent::new(
            EventKind::Authenticated,
            conn_id,
            Some(identity_id),
        ));
        Ok(())
    }

    fn unbind_identity(&mut self, conn_id: ConnectionId, identity_id: &IdentityId) {
        self.rooms.leave(conn_id, &RoomName::for_identity(identity_id));
        self.presence.release(identity_id, conn_id);
    }
}

/// Owns every live connection and the room and presence state derived
/// from them.
///
/// Shared between connection tasks behind an `Arc` (via the gateway).
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
    events: EventBus,
}

impl ConnectionRegistry {
    pub fn new(events: EventBus) -> Self {
        Self::with_rooms(events, RoomTable::new())
    }

    /// Creates a registry whose rooms replicate through `adapter`.
    pub fn with_adapter(
        events: EventBus,
        adapter: Box<dyn BroadcastAdapter>,
    ) -> Self {
        Self::with_rooms(events, RoomTable::with_adapter(adapter))
    }

    fn with_rooms(events: EventBus, rooms: RoomTable) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                connections: HashMap::new(),
                rooms,
                presence: PresenceRegistry::new(events.clone()),
                events: events.clone(),
            }),
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Marks a connection as pending while its credentials resolve.
    pub async fn reserve(&self, conn_id: ConnectionId) {
        let mut state = self.state.lock().await;
        state.connections.entry(conn_id).or_insert(Slot::Reserved);
    }

    /// Registers a reserved connection.
    ///
    /// Joins the global and public rooms, emits `connection-opened`, and,
    /// when `auth` carries a resolved identity, joins the identity room,
    /// binds presence, and emits `authenticated`.
    ///
    /// Returns [`ConnectOutcome::Discarded`] if the reservation was
    /// cancelled by a disconnect in the meantime.
    pub async fn connect(
        &self,
        conn_id: ConnectionId,
        sender: OutboundSender,
        auth: Option<(Identity, String)>,
    ) -> Result<ConnectOutcome, GatewayError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        match state.connections.get(&conn_id) {
            Some(Slot::Reserved) => {}
            Some(Slot::Live(_)) => {
                tracing::debug!(%conn_id, "connection already registered");
                return Ok(ConnectOutcome::Discarded);
            }
            None => {
                tracing::debug!(
                    %conn_id,
                    "connection closed during authentication; result discarded"
                );
                return Ok(ConnectOutcome::Discarded);
            }
        }

        state
            .connections
            .insert(conn_id, Slot::Live(ConnectionEntry::default()));
        state.rooms.attach(conn_id, sender);
        state.rooms.join(conn_id, &RoomName::global())?;
        state.rooms.join(conn_id, &RoomName::public())?;

        tracing::info!(%conn_id, "connection opened");
        state.events.emit(LifecycleEvent::new(
            EventKind::ConnectionOpened,
            conn_id,
            None,
        ));

        let authenticated = match auth {
            Some((identity, credential)) => {
                state.bind_identity(conn_id, identity, credential)?;
                true
            }
            None => false,
        };
        Ok(ConnectOutcome::Registered { authenticated })
    }

    /// Starts an in-band login and returns its epoch, or `None` if the
    /// connection isn't live.
    pub async fn begin_login(&self, conn_id: ConnectionId) -> Option<u64> {
        let mut state = self.state.lock().await;
        let entry = state.entry_mut(conn_id)?;
        entry.login_epoch += 1;
        Some(entry.login_epoch)
    }

    /// Applies the result of the in-band login started at `epoch`.
    ///
    /// A result older than the last applied login is dropped as
    /// [`AuthOutcome::Superseded`]; a newer login that failed does not
    /// block it.
    ///
    /// Binding a different identity first releases the previous one.
    /// Re-binding the same identity refreshes the stored credential
    /// without a presence transition. Either way `authenticated` is
    /// emitted and the connection is sent an `auth:authenticated` reply.
    pub async fn authenticate(
        &self,
        conn_id: ConnectionId,
        epoch: u64,
        identity: Identity,
        credential: String,
    ) -> Result<AuthOutcome, GatewayError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let previous = match state.entry_mut(conn_id) {
            Some(entry) if epoch <= entry.applied_epoch => {
                tracing::debug!(%conn_id, epoch, "stale login result dropped");
                return Ok(AuthOutcome::Superseded);
            }
            Some(entry) => {
                entry.applied_epoch = epoch;
                entry.identity.as_ref().map(|i| i.id.clone())
            }
            None => {
                tracing::debug!(
                    %conn_id,
                    "login resolved after disconnect; result discarded"
                );
                return Ok(AuthOutcome::Discarded);
            }
        };

        let reply = ServerMessage::Authenticated {
            identity: identity.clone(),
            credential: credential.clone(),
        };

        let outcome = match previous {
            Some(previous) if previous == identity.id => {
                if let Some(entry) = state.entry_mut(conn_id) {
                    entry.identity = Some(identity);
                    entry.credential = Some(credential);
                }
                tracing::info!(%conn_id, identity_id = %previous, "credential refreshed");
                state.events.emit(LifecycleEvent::new(
                    EventKind::Authenticated,
                    conn_id,
                    Some(previous),
                ));
                AuthOutcome::Refreshed
            }
            Some(previous) => {
                state.unbind_identity(conn_id, &previous);
                state.bind_identity(conn_id, identity, credential)?;
                AuthOutcome::Attached
            }
            None => {
                state.bind_identity(conn_id, identity, credential)?;
                AuthOutcome::Attached
            }
        };

        state.rooms.send_to(conn_id, reply);
        Ok(outcome)
    }

    /// Removes a connection.
    ///
    /// Cancels a pending reservation, or leaves every room, releases
    /// presence (which may emit `identity-went-offline`), and emits
    /// `connection-closed`. Returns `false` for an unknown connection.
    pub async fn disconnect(&self, conn_id: ConnectionId) -> bool {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let identity_id = match state.connections.get(&conn_id) {
            None => {
                tracing::debug!(%conn_id, "disconnect of unknown connection ignored");
                return false;
            }
            Some(Slot::Reserved) => {
                state.connections.remove(&conn_id);
                tracing::debug!(%conn_id, "reservation cancelled");
                return true;
            }
            Some(Slot::Live(entry)) => entry.identity.as_ref().map(|i| i.id.clone()),
        };

        state.rooms.detach(conn_id);
        if let Some(identity_id) = &identity_id {
            state.presence.release(identity_id, conn_id);
        }
        state.connections.remove(&conn_id);

        tracing::info!(%conn_id, "connection closed");
        state.events.emit(LifecycleEvent::new(
            EventKind::ConnectionClosed,
            conn_id,
            identity_id,
        ));
        true
    }

    pub async fn is_online(&self, identity_id: &IdentityId) -> bool {
        self.state.lock().await.presence.is_online(identity_id)
    }

    /// Online identities, sorted.
    pub async fn online_identities(&self) -> Vec<IdentityId> {
        self.state.lock().await.presence.online()
    }

    /// Number of registered connections. Reservations are not counted.
    pub async fn connection_count(&self) -> usize {
        self.state
            .lock()
            .await
            .connections
            .values()
            .filter(|slot| matches!(slot, Slot::Live(_)))
            .count()
    }

    /// Live connections bound to an identity, sorted.
    pub async fn connections_of(&self, identity_id: &IdentityId) -> Vec<ConnectionId> {
        self.state.lock().await.presence.connections(identity_id)
    }

    /// The identity bound to a connection, if any.
    pub async fn identity_of(&self, conn_id: ConnectionId) -> Option<Identity> {
        self.state
            .lock()
            .await
            .entry_mut(conn_id)
            .and_then(|entry| entry.identity.clone())
    }

    /// The credential a connection authenticated with, if any.
    pub async fn credential_of(&self, conn_id: ConnectionId) -> Option<String> {
        self.state
            .lock()
            .await
            .entry_mut(conn_id)
            .and_then(|entry| entry.credential.clone())
    }

    /// Rooms a connection belongs to, sorted by name.
    pub async fn rooms_of(&self, conn_id: ConnectionId) -> Vec<RoomName> {
        self.state.lock().await.rooms.rooms_of(conn_id)
    }

    /// Members of a room, sorted.
    pub async fn members(&self, room: &RoomName) -> Vec<ConnectionId> {
        self.state.lock().await.rooms.members(room)
    }

    /// Adds a live connection to an application room. Returns `true` if
    /// it wasn't already a member.
    pub async fn join_room(
        &self,
        conn_id: ConnectionId,
        room: &RoomName,
    ) -> Result<bool, GatewayError> {
        Ok(self.state.lock().await.rooms.join(conn_id, room)?)
    }

    /// Removes a connection from a room. Returns `true` if it was a member.
    pub async fn leave_room(&self, conn_id: ConnectionId, room: &RoomName) -> bool {
        self.state.lock().await.rooms.leave(conn_id, room)
    }

    /// Broadcasts to a room, optionally skipping one connection. Returns
    /// the number of local deliveries.
    pub async fn send_to_room(
        &self,
        room: &RoomName,
        msg: &ServerMessage,
        exclude: Option<ConnectionId>,
    ) -> usize {
        self.state.lock().await.rooms.broadcast(room, msg, exclude)
    }

    /// Sends to every connection of an identity through its exclusive room.
    pub async fn send_to_identity(
        &self,
        identity_id: &IdentityId,
        msg: &ServerMessage,
    ) -> usize {
        self.send_to_room(&RoomName::for_identity(identity_id), msg, None)
            .await
    }

    /// Sends to a single connection. Returns `false` if it isn't live.
    pub async fn send_to_connection(
        &self,
        conn_id: ConnectionId,
        msg: ServerMessage,
    ) -> bool {
        self.state.lock().await.rooms.send_to(conn_id, msg)
    }

    /// Delivers a broadcast received from another gateway instance to
    /// local members only.
    pub async fn deliver_remote(
        &self,
        room: &RoomName,
        msg: &ServerMessage,
        exclude: Option<ConnectionId>,
    ) -> usize {
        self.state.lock().await.rooms.deliver_remote(room, msg, exclude)
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}
