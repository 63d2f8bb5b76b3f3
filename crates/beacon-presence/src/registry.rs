//! The presence registry: identity → live connections.
//!
//! # Concurrency note
//!
//! `PresenceRegistry` is NOT thread-safe by itself. The gateway owns it
//! inside its connection registry, behind the same lock as the room
//! table, so every bind/release is linearized with the connection and
//! room updates around it.

use std::collections::{HashMap, HashSet};

use beacon_protocol::IdentityId;
use beacon_transport::ConnectionId;

use crate::{EventBus, EventKind, LifecycleEvent, PresenceError};

/// Result of [`PresenceRegistry::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// First connection for the identity; `identity-went-online` fired.
    WentOnline,
    /// The identity was already online through other connections.
    Joined,
    /// The connection was already bound to this identity. Nothing changed.
    AlreadyBound,
}

/// Result of [`PresenceRegistry::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Last connection released; `identity-went-offline` fired.
    WentOffline,
    /// Other connections keep the identity online.
    StillOnline { remaining: usize },
    /// The pair wasn't tracked. Nothing changed.
    NotTracked,
}

/// Tracks which identities are online and through which connections.
///
/// ```text
/// bind(u1, c1) ──→ {u1: [c1]}       → identity-went-online
/// bind(u1, c2) ──→ {u1: [c1, c2]}
/// release(u1, c1) → {u1: [c2]}
/// release(u1, c2) → {}              → identity-went-offline
/// ```
#[derive(Debug)]
pub struct PresenceRegistry {
    /// Live connections per online identity. Never holds an empty set.
    identities: HashMap<IdentityId, HashSet<ConnectionId>>,

    /// Reverse index: which identity a connection is bound to. Kept in
    /// sync with `identities`; enforces one identity per connection.
    owners: HashMap<ConnectionId, IdentityId>,

    events: EventBus,
}

impl PresenceRegistry {
    pub fn new(events: EventBus) -> Self {
        Self {
            identities: HashMap::new(),
            owners: HashMap::new(),
            events,
        }
    }

    /// Binds a connection to an identity.
    ///
    /// Emits `identity-went-online` when this is the identity's first
    /// live connection.
    ///
    /// # Errors
    /// Returns [`PresenceError::AlreadyClaimed`] if the connection is
    /// bound to a different identity.
    pub fn bind(
        &mut self,
        identity_id: &IdentityId,
        conn_id: ConnectionId,
    ) -> Result<BindOutcome, PresenceError> {
        if let Some(owner) = self.owners.get(&conn_id) {
            if owner == identity_id {
                return Ok(BindOutcome::AlreadyBound);
            }
            return Err(PresenceError::AlreadyClaimed(conn_id, owner.clone()));
        }

        let connections =
            self.identities.entry(identity_id.clone()).or_default();
        let went_online = connections.is_empty();
        connections.insert(conn_id);
        self.owners.insert(conn_id, identity_id.clone());

        if went_online {
            tracing::info!(%identity_id, %conn_id, "identity online");
            self.events.emit(LifecycleEvent::new(
                EventKind::IdentityWentOnline,
                conn_id,
                Some(identity_id.clone()),
            ));
            Ok(BindOutcome::WentOnline)
        } else {
            Ok(BindOutcome::Joined)
        }
    }

    /// Releases a connection from an identity.
    ///
    /// Emits `identity-went-offline` exactly once, when the last
    /// connection goes. Releasing an untracked pair is a no-op.
    pub fn release(
        &mut self,
        identity_id: &IdentityId,
        conn_id: ConnectionId,
    ) -> ReleaseOutcome {
        if self.owners.get(&conn_id) != Some(identity_id) {
            tracing::debug!(
                %identity_id,
                %conn_id,
                "release of untracked connection ignored"
            );
            return ReleaseOutcome::NotTracked;
        }
        self.owners.remove(&conn_id);

        let Some(connections) = self.identities.get_mut(identity_id) else {
            return ReleaseOutcome::NotTracked;
        };
        connections.remove(&conn_id);
        let remaining = connections.len();
        if remaining > 0 {
            return ReleaseOutcome::StillOnline { remaining };
        }

        self.identities.remove(identity_id);
        tracing::info!(%identity_id, %conn_id, "identity offline");
        self.events.emit(LifecycleEvent::new(
            EventKind::IdentityWentOffline,
            conn_id,
            Some(identity_id.clone()),
        ));
        ReleaseOutcome::WentOffline
    }

    /// Returns `true` iff the identity has at least one live connection.
    pub fn is_online(&self, identity_id: &IdentityId) -> bool {
        self.identities
            .get(identity_id)
            .is_some_and(|c| !c.is_empty())
    }

    /// Returns the identity's live connections, in ascending id order.
    pub fn connections(&self, identity_id: &IdentityId) -> Vec<ConnectionId> {
        let mut conns: Vec<ConnectionId> = self
            .identities
            .get(identity_id)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default();
        conns.sort();
        conns
    }

    /// Returns the identity a connection is bound to.
    pub fn owner(&self, conn_id: ConnectionId) -> Option<&IdentityId> {
        self.owners.get(&conn_id)
    }

    /// Returns every online identity, sorted.
    pub fn online(&self) -> Vec<IdentityId> {
        let mut ids: Vec<IdentityId> = self.identities.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of online identities.
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for `PresenceRegistry`.
    //!
    //! Events are collected through a channel subscriber and drained
    //! with `try_recv`, since emission is synchronous.

    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn registry() -> (PresenceRegistry, UnboundedReceiver<LifecycleEvent>) {
        let bus = EventBus::new();
        let rx = bus.subscribe_channel();
        (PresenceRegistry::new(bus), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<LifecycleEvent>) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind);
        }
        kinds
    }

    fn uid(id: &str) -> IdentityId {
        IdentityId::new(id)
    }

    fn cid(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    // =====================================================================
    // bind()
    // =====================================================================

    #[test]
    fn test_bind_first_connection_goes_online() {
        let (mut reg, mut rx) = registry();

        let outcome = reg.bind(&uid("u1"), cid(1)).unwrap();

        assert_eq!(outcome, BindOutcome::WentOnline);
        assert!(reg.is_online(&uid("u1")));
        assert_eq!(drain(&mut rx), vec![EventKind::IdentityWentOnline]);
    }

    #[test]
    fn test_bind_second_connection_emits_nothing() {
        let (mut reg, mut rx) = registry();
        reg.bind(&uid("u1"), cid(1)).unwrap();
        drain(&mut rx);

        let outcome = reg.bind(&uid("u1"), cid(2)).unwrap();

        assert_eq!(outcome, BindOutcome::Joined);
        assert_eq!(reg.connections(&uid("u1")), vec![cid(1), cid(2)]);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_bind_same_pair_twice_is_noop() {
        let (mut reg, mut rx) = registry();
        reg.bind(&uid("u1"), cid(1)).unwrap();
        drain(&mut rx);

        let outcome = reg.bind(&uid("u1"), cid(1)).unwrap();

        assert_eq!(outcome, BindOutcome::AlreadyBound);
        assert_eq!(reg.connections(&uid("u1")), vec![cid(1)]);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_bind_connection_owned_by_other_identity_fails() {
        let (mut reg, _rx) = registry();
        reg.bind(&uid("u1"), cid(1)).unwrap();

        let result = reg.bind(&uid("u2"), cid(1));

        assert!(matches!(
            result,
            Err(PresenceError::AlreadyClaimed(c, ref owner)) if c == cid(1) && *owner == uid("u1")
        ));
        assert!(!reg.is_online(&uid("u2")));
    }

    // =====================================================================
    // release()
    // =====================================================================

    #[test]
    fn test_release_offline_fires_only_after_last_connection() {
        let (mut reg, mut rx) = registry();
        for c in 1..=3 {
            reg.bind(&uid("u1"), cid(c)).unwrap();
        }
        drain(&mut rx);

        assert_eq!(
            reg.release(&uid("u1"), cid(2)),
            ReleaseOutcome::StillOnline { remaining: 2 }
        );
        assert_eq!(
            reg.release(&uid("u1"), cid(1)),
            ReleaseOutcome::StillOnline { remaining: 1 }
        );
        assert!(reg.is_online(&uid("u1")));
        assert!(drain(&mut rx).is_empty());

        assert_eq!(reg.release(&uid("u1"), cid(3)), ReleaseOutcome::WentOffline);
        assert!(!reg.is_online(&uid("u1")));
        assert_eq!(drain(&mut rx), vec![EventKind::IdentityWentOffline]);
    }

    #[test]
    fn test_release_twice_is_idempotent() {
        let (mut reg, mut rx) = registry();
        reg.bind(&uid("u1"), cid(1)).unwrap();
        reg.release(&uid("u1"), cid(1));
        drain(&mut rx);

        assert_eq!(reg.release(&uid("u1"), cid(1)), ReleaseOutcome::NotTracked);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_release_unknown_identity_is_noop() {
        let (mut reg, mut rx) = registry();

        assert_eq!(reg.release(&uid("ghost"), cid(9)), ReleaseOutcome::NotTracked);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_release_with_wrong_identity_keeps_binding() {
        let (mut reg, mut rx) = registry();
        reg.bind(&uid("u1"), cid(1)).unwrap();
        drain(&mut rx);

        assert_eq!(reg.release(&uid("u2"), cid(1)), ReleaseOutcome::NotTracked);
        assert!(reg.is_online(&uid("u1")));
        assert_eq!(reg.owner(cid(1)), Some(&uid("u1")));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_rebind_after_offline_goes_online_again() {
        let (mut reg, mut rx) = registry();
        reg.bind(&uid("u1"), cid(1)).unwrap();
        reg.release(&uid("u1"), cid(1));
        reg.bind(&uid("u1"), cid(2)).unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                EventKind::IdentityWentOnline,
                EventKind::IdentityWentOffline,
                EventKind::IdentityWentOnline,
            ]
        );
    }

    // =====================================================================
    // queries
    // =====================================================================

    #[test]
    fn test_online_lists_identities_sorted() {
        let (mut reg, _rx) = registry();
        reg.bind(&uid("b"), cid(1)).unwrap();
        reg.bind(&uid("a"), cid(2)).unwrap();
        reg.bind(&uid("a"), cid(3)).unwrap();

        assert_eq!(reg.online(), vec![uid("a"), uid("b")]);
        assert_eq!(reg.len(), 2);
        assert!(!reg.is_empty());
    }

    #[test]
    fn test_events_carry_identity_and_connection() {
        let (mut reg, mut rx) = registry();
        reg.bind(&uid("u1"), cid(5)).unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.conn_id, cid(5));
        assert_eq!(event.identity_id, Some(uid("u1")));
    }
}
