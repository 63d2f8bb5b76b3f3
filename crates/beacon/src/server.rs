//! `GatewayServer` builder and server loop.
//!
//! This is the entry point for running a Beacon gateway. It ties together
//! all the layers: transport → auth → registry (rooms + presence).

use std::sync::Arc;
use std::time::Duration;

use beacon_auth::{AuthConfig, AuthStage, CredentialResolver, SessionStage};
use beacon_presence::{EventBus, LifecycleSubscriber};
use beacon_room::BroadcastAdapter;
use beacon_transport::{Transport, WebSocketTransport};

use crate::gateway::Gateway;
use crate::handler::handle_connection;
use crate::{GatewayConfig, GatewayError};

/// Builder for configuring and starting a gateway.
///
/// # Example
///
/// ```rust,ignore
/// use beacon::prelude::*;
///
/// let server = GatewayServer::builder()
///     .bind("0.0.0.0:8080")
///     .session_resolver(SessionResolver::new(sessions))
///     .build(TokenResolver::new(tokens, &AuthConfig::default()))
///     .await?;
/// server.run().await
/// ```
pub struct GatewayBuilder {
    config: GatewayConfig,
    session_stage: Option<Box<dyn AuthStage>>,
    adapter: Option<Box<dyn BroadcastAdapter>>,
    events: EventBus,
}

impl GatewayBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            session_stage: None,
            adapter: None,
            events: EventBus::new(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the auth configuration.
    pub fn auth_config(mut self, auth: AuthConfig) -> Self {
        self.config.auth = auth;
        self
    }

    /// Closes connections that show no activity, keepalives included,
    /// for `timeout`. A zero duration turns the timeout off.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.config.idle_timeout_ms = (millis > 0).then_some(millis);
        self
    }

    /// Adds a session-reference stage after the token stage. Skipped when
    /// `auth.session_enabled` is off.
    pub fn session_resolver(mut self, resolver: impl CredentialResolver) -> Self {
        self.session_stage = Some(Box::new(SessionStage::new(Arc::new(resolver))));
        self
    }

    /// Replicates rooms through an external adapter.
    pub fn adapter(mut self, adapter: impl BroadcastAdapter) -> Self {
        self.adapter = Some(Box::new(adapter));
        self
    }

    /// Registers a lifecycle subscriber before any connection is accepted.
    pub fn on_event(self, subscriber: impl LifecycleSubscriber) -> Self {
        self.events.subscribe(subscriber);
        self
    }

    /// Builds a gateway without a listener, for driving it from another
    /// transport.
    pub fn build_gateway<R: CredentialResolver>(self, token_resolver: R) -> Gateway<R> {
        Gateway::new(
            self.config,
            token_resolver,
            self.session_stage,
            self.adapter,
            self.events,
        )
    }

    /// Binds the WebSocket listener and builds the server.
    pub async fn build<R: CredentialResolver>(
        self,
        token_resolver: R,
    ) -> Result<GatewayServer<R>, GatewayError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        let gateway = Arc::new(self.build_gateway(token_resolver));
        Ok(GatewayServer { transport, gateway })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound gateway server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct GatewayServer<R> {
    transport: WebSocketTransport,
    gateway: Arc<Gateway<R>>,
}

impl GatewayServer<()> {
    /// Creates a new builder. The resolver type is fixed later by
    /// [`GatewayBuilder::build`].
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }
}

impl<R: CredentialResolver> GatewayServer<R> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The gateway shared with every connection task. Clone it before
    /// [`run`](Self::run) to query presence or send to rooms.
    pub fn gateway(&self) -> &Arc<Gateway<R>> {
        &self.gateway
    }

    /// Runs the server accept loop.
    ///
    /// Spawns a handler task for each accepted connection. Runs until the
    /// process is terminated.
    pub async fn run(mut self) -> Result<(), GatewayError> {
        tracing::info!(addr = ?self.local_addr().ok(), "beacon gateway running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let gateway = Arc::clone(&self.gateway);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, gateway).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
