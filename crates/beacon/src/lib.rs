//! # Beacon
//!
//! Real-time connection gateway.
//!
//! Beacon accepts persistent WebSocket connections, authenticates each one
//! through a chain of credential resolvers, tracks which identities are
//! online across all their connections, and groups connections into rooms
//! for targeted delivery.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use beacon::prelude::*;
//!
//! # async fn run() -> Result<(), GatewayError> {
//! let tokens = MemoryTokenStore::new();
//! let config = AuthConfig::default();
//! let server = GatewayServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .on_event(|event: &LifecycleEvent| println!("{}", event.kind))
//!     .build(TokenResolver::new(tokens, &config))
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod gateway;
mod handler;
mod registry;
mod server;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::{Gateway, LoginAttempt, LoginOutcome};
pub use registry::{AuthOutcome, ConnectOutcome, ConnectionRegistry};
pub use server::{GatewayBuilder, GatewayServer};

/// Convenient re-exports for building and embedding a gateway.
pub mod prelude {
    pub use crate::{
        AuthOutcome, ConnectOutcome, ConnectionRegistry, Gateway, GatewayBuilder,
        GatewayConfig, GatewayError, GatewayServer, LoginOutcome,
    };
    pub use beacon_auth::{
        AuthConfig, AuthError, CredentialResolver, MemorySessionStore,
        MemoryTokenStore, SessionResolver, SessionStore, StoreError, TokenRecord,
        TokenResolver, TokenStore,
    };
    pub use beacon_presence::{EventBus, EventKind, LifecycleEvent, LifecycleSubscriber};
    pub use beacon_protocol::{
        AccessScope, ClientMessage, Identity, IdentityId, RoomName, ServerMessage,
    };
    pub use beacon_room::{AdapterConfig, BroadcastAdapter, ChannelAdapter};
    pub use beacon_transport::{ConnectionId, Handshake};
}
