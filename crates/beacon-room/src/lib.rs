//! Rooms: named broadcast groups of connections.
//!
//! # Key types
//!
//! - [`RoomTable`]: membership sets plus each connection's outbound
//!   channel; delivers broadcasts
//! - [`BroadcastAdapter`]: optional hook that replicates joins, leaves,
//!   and broadcasts to other gateway instances
//! - [`ChannelAdapter`]: an adapter that hands replication traffic to a
//!   channel for a bus task to forward
//!
//! Without an adapter, rooms are process-local.

mod adapter;
mod error;
mod table;

pub use adapter::{AdapterConfig, AdapterEvent, BroadcastAdapter, ChannelAdapter};
pub use error::RoomError;
pub use table::{OutboundSender, RoomTable};
