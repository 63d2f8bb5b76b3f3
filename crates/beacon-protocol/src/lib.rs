//! Wire protocol for Beacon.
//!
//! This crate defines what travels between a client and the gateway, and
//! the identity vocabulary shared by every other layer:
//!
//! - **Types** ([`IdentityId`], [`Identity`], [`AccessScope`], [`RoomName`])
//! - **Messages** ([`ClientMessage`], [`ServerMessage`]): the in-band
//!   `{"type": ..., "payload": ...}` frames.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): bytes in, messages out.
//! - **Errors** ([`ProtocolError`])
//!
//! ```text
//! Transport (bytes) → Protocol (messages) → Auth / Rooms / Presence
//! ```

mod codec;
mod error;
mod message;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use message::{ClientMessage, ServerMessage};
pub use types::{AccessScope, Identity, IdentityId, RoomName};
