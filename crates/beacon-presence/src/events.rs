//! Lifecycle events and their fan-out.
//!
//! Events are delivered synchronously, on the emitting task, in the order
//! the registry produced them. There is no buffering, persistence, or
//! replay: a subscriber that wasn't registered when an event fired never
//! sees it.
//!
//! Subscribers run while the gateway's registry lock is held. They must
//! return quickly and must not call back into the gateway; hand the event
//! off to a channel (see [`EventBus::subscribe_channel`]) for anything
//! heavier.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use beacon_protocol::IdentityId;
use beacon_transport::ConnectionId;
use tokio::sync::mpsc;

/// Which transition an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A connection was registered and joined the default rooms.
    ConnectionOpened,
    /// An identity was attached to a connection.
    Authenticated,
    /// A connection was removed.
    ConnectionClosed,
    /// An identity's first live connection was bound.
    IdentityWentOnline,
    /// An identity's last live connection was released.
    IdentityWentOffline,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionOpened => "connection-opened",
            Self::Authenticated => "authenticated",
            Self::ConnectionClosed => "connection-closed",
            Self::IdentityWentOnline => "identity-went-online",
            Self::IdentityWentOffline => "identity-went-offline",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub kind: EventKind,
    /// The connection whose change triggered the event.
    pub conn_id: ConnectionId,
    /// The identity involved, if the connection had one.
    pub identity_id: Option<IdentityId>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl LifecycleEvent {
    pub fn new(
        kind: EventKind,
        conn_id: ConnectionId,
        identity_id: Option<IdentityId>,
    ) -> Self {
        Self {
            kind,
            conn_id,
            identity_id,
            timestamp: now_millis(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Receives lifecycle events.
pub trait LifecycleSubscriber: Send + Sync + 'static {
    fn on_event(&self, event: &LifecycleEvent);

    /// Returns `true` once the subscriber can no longer receive events.
    /// The bus drops closed subscribers.
    fn is_closed(&self) -> bool {
        false
    }
}

impl<F> LifecycleSubscriber for F
where
    F: Fn(&LifecycleEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: &LifecycleEvent) {
        self(event)
    }
}

/// Forwards events into an unbounded channel.
struct ChannelSubscriber(mpsc::UnboundedSender<LifecycleEvent>);

impl LifecycleSubscriber for ChannelSubscriber {
    fn on_event(&self, event: &LifecycleEvent) {
        // A send error means the receiver is gone; pruned on the next emit.
        let _ = self.0.send(event.clone());
    }

    fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

/// Fans events out to every registered subscriber.
///
/// Cheap to clone; clones share the subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<Vec<Arc<dyn LifecycleSubscriber>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber for all future events.
    pub fn subscribe(&self, subscriber: impl LifecycleSubscriber) {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|s| !s.is_closed());
        subscribers.push(Arc::new(subscriber));
    }

    /// Registers a channel subscriber and returns its receiving end.
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<LifecycleEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(ChannelSubscriber(tx));
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delivers `event` to every subscriber, in registration order.
    pub fn emit(&self, event: LifecycleEvent) {
        tracing::trace!(
            kind = %event.kind,
            conn_id = %event.conn_id,
            identity_id = ?event.identity_id,
            "lifecycle event"
        );
        let mut closed = false;
        {
            let subscribers = self
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            for subscriber in subscribers.iter() {
                if subscriber.is_closed() {
                    closed = true;
                } else {
                    subscriber.on_event(&event);
                }
            }
        }
        if closed {
            self.subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|s| !s.is_closed());
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn event(kind: EventKind) -> LifecycleEvent {
        LifecycleEvent::new(kind, ConnectionId::new(1), None)
    }

    #[test]
    fn test_emit_reaches_every_subscriber_in_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        bus.subscribe(move |e: &LifecycleEvent| {
            first.lock().unwrap().push(("first", e.kind));
        });
        let second = Arc::clone(&seen);
        bus.subscribe(move |e: &LifecycleEvent| {
            second.lock().unwrap().push(("second", e.kind));
        });

        bus.emit(event(EventKind::ConnectionOpened));
        bus.emit(event(EventKind::ConnectionClosed));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("first", EventKind::ConnectionOpened),
                ("second", EventKind::ConnectionOpened),
                ("first", EventKind::ConnectionClosed),
                ("second", EventKind::ConnectionClosed),
            ]
        );
    }

    #[test]
    fn test_subscribe_channel_receives_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_channel();

        bus.emit(event(EventKind::Authenticated));

        let received = rx.try_recv().expect("event should be queued");
        assert_eq!(received.kind, EventKind::Authenticated);
        assert!(received.timestamp > 0);
    }

    #[test]
    fn test_emit_prunes_dropped_channel() {
        let bus = EventBus::new();
        let mut kept = bus.subscribe_channel();
        drop(bus.subscribe_channel());
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(event(EventKind::ConnectionOpened));

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv().unwrap().kind, EventKind::ConnectionOpened);
    }

    #[test]
    fn test_subscribe_channel_reuses_dropped_slots() {
        let bus = EventBus::new();
        for _ in 0..10 {
            drop(bus.subscribe_channel());
        }
        let _rx = bus.subscribe_channel();
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_clones_share_subscribers() {
        let bus = EventBus::new();
        let clone = bus.clone();
        let mut rx = clone.subscribe_channel();

        bus.emit(event(EventKind::IdentityWentOnline));

        assert_eq!(rx.try_recv().unwrap().kind, EventKind::IdentityWentOnline);
    }

    #[test]
    fn test_event_kind_names() {
        assert_eq!(EventKind::IdentityWentOffline.to_string(), "identity-went-offline");
        assert_eq!(EventKind::ConnectionOpened.as_str(), "connection-opened");
    }
}
