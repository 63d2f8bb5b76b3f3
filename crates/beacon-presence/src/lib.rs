//! Presence tracking and lifecycle events for Beacon.
//!
//! - [`PresenceRegistry`]: which identities are online, and through
//!   which connections. An identity is online while at least one of its
//!   connections is live.
//! - [`EventBus`]: synchronous fan-out of [`LifecycleEvent`]s to
//!   subscribers.
//!
//! Presence is per-**identity**, not per-connection: a second tab for the
//! same user does not make them "come online" again, and closing one of
//! two tabs does not take them offline.

mod error;
mod events;
mod registry;

pub use error::PresenceError;
pub use events::{EventBus, EventKind, LifecycleEvent, LifecycleSubscriber};
pub use registry::{BindOutcome, PresenceRegistry, ReleaseOutcome};
