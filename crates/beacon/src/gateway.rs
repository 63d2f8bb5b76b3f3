//! The gateway: authentication pipeline in front of the connection
//! registry.
//!
//! A [`Gateway`] is transport-agnostic. The server module feeds it
//! WebSocket connections, but anything that can hand over a
//! [`ConnectionId`], its [`Handshake`], and an outbound channel can drive
//! it directly.

use std::sync::Arc;

use beacon_auth::{
    AuthContext, AuthError, AuthStage, CredentialResolver, Pipeline, TokenStage,
};
use beacon_presence::EventBus;
use beacon_protocol::{ClientMessage, Codec, IdentityId, JsonCodec, ProtocolError, ServerMessage};
use beacon_room::{BroadcastAdapter, OutboundSender};
use beacon_transport::{ConnectionId, Handshake};

use crate::registry::{AuthOutcome, ConnectOutcome, ConnectionRegistry};
use crate::{GatewayConfig, GatewayError};

/// Result of an in-band `auth:login:token`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The message carried no token.
    Ignored,
    /// The token resolved to no identity (unknown, revoked, or expired).
    Unresolved,
    /// The token resolved; the registry decided what happened to it.
    Resolved(AuthOutcome),
}

/// An in-band login whose token is being resolved.
///
/// Obtained from [`Gateway::begin_login`] in message-arrival order, so a
/// slow lookup can't overwrite the result of a later one.
#[derive(Debug)]
pub struct LoginAttempt {
    conn_id: ConnectionId,
    epoch: u64,
    token: String,
}

impl LoginAttempt {
    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }
}

/// Authenticates connections and tracks them once they're registered.
pub struct Gateway<R> {
    config: GatewayConfig,
    pipeline: Pipeline,
    /// Shared with the pipeline's token stage; reused for in-band logins.
    token_resolver: Arc<R>,
    registry: ConnectionRegistry,
    codec: JsonCodec,
}

impl<R: CredentialResolver> Gateway<R> {
    pub(crate) fn new(
        config: GatewayConfig,
        token_resolver: R,
        session_stage: Option<Box<dyn AuthStage>>,
        adapter: Option<Box<dyn BroadcastAdapter>>,
        events: EventBus,
    ) -> Self {
        let token_resolver = Arc::new(token_resolver);
        let mut pipeline =
            Pipeline::new().stage(TokenStage::new(Arc::clone(&token_resolver)));
        match session_stage {
            Some(stage) if config.auth.session_enabled => pipeline.push(stage),
            Some(stage) => {
                tracing::debug!(stage = stage.name(), "session auth disabled; stage skipped");
            }
            None => {}
        }

        let registry = match adapter {
            Some(adapter) => {
                tracing::info!(adapter = adapter.name(), "broadcast adapter attached");
                ConnectionRegistry::with_adapter(events, adapter)
            }
            None => {
                if let Some(adapter) = &config.adapter {
                    tracing::warn!(
                        adapter = %adapter.name,
                        "adapter configured but none supplied; rooms are process-local"
                    );
                }
                ConnectionRegistry::new(events)
            }
        };

        Self {
            config,
            pipeline,
            token_resolver,
            registry,
            codec: JsonCodec,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        self.registry.events()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub async fn is_online(&self, identity_id: &IdentityId) -> bool {
        self.registry.is_online(identity_id).await
    }

    /// Authenticates a new connection from its handshake and registers it.
    ///
    /// The connection is reserved before the pipeline runs. If it closes
    /// (see [`close`](Self::close)) while a lookup is pending, the result
    /// is discarded and nothing is registered.
    ///
    /// Pipeline failures leave the connection unauthenticated, except a
    /// malformed credential when `auth.reject_malformed_handshake` is set.
    ///
    /// # Errors
    /// Returns [`GatewayError::Rejected`] for a refused handshake.
    pub async fn open(
        &self,
        conn_id: ConnectionId,
        handshake: Handshake,
        sender: OutboundSender,
    ) -> Result<ConnectOutcome, GatewayError> {
        self.registry.reserve(conn_id).await;

        let mut ctx = AuthContext::new(conn_id, handshake);
        if let Err(e) = self.pipeline.run(&mut ctx).await {
            if e.is_malformed_credential() && self.config.auth.reject_malformed_handshake {
                tracing::info!(%conn_id, error = %e, "handshake rejected");
                self.registry.disconnect(conn_id).await;
                return Err(GatewayError::Rejected(e));
            }
            log_auth_failure(conn_id, &e);
        }

        self.registry.connect(conn_id, sender, ctx.into_identity()).await
    }

    /// Removes a connection, or cancels its pending registration.
    pub async fn close(&self, conn_id: ConnectionId) -> bool {
        self.registry.disconnect(conn_id).await
    }

    /// Starts an in-band login. Returns `None` when the token is missing
    /// or the connection isn't live.
    pub async fn begin_login(
        &self,
        conn_id: ConnectionId,
        auth_token: Option<String>,
    ) -> Option<LoginAttempt> {
        let Some(token) = auth_token.filter(|t| !t.is_empty()) else {
            tracing::debug!(%conn_id, "login without token ignored");
            return None;
        };
        let epoch = self.registry.begin_login(conn_id).await?;
        Some(LoginAttempt {
            conn_id,
            epoch,
            token,
        })
    }

    /// Resolves the attempt's token and applies the identity.
    ///
    /// Failures are logged here and produce no reply to the client.
    pub async fn finish_login(
        &self,
        attempt: LoginAttempt,
    ) -> Result<LoginOutcome, GatewayError> {
        let LoginAttempt {
            conn_id,
            epoch,
            token,
        } = attempt;

        let identity = match self.token_resolver.resolve(&token).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                tracing::debug!(%conn_id, "login token did not resolve");
                return Ok(LoginOutcome::Unresolved);
            }
            Err(e) => {
                log_auth_failure(conn_id, &e);
                return Err(e.into());
            }
        };

        let outcome = self
            .registry
            .authenticate(conn_id, epoch, identity, token)
            .await?;
        Ok(LoginOutcome::Resolved(outcome))
    }

    /// [`begin_login`](Self::begin_login) and
    /// [`finish_login`](Self::finish_login) in one call.
    pub async fn login_with_token(
        &self,
        conn_id: ConnectionId,
        auth_token: Option<String>,
    ) -> Result<LoginOutcome, GatewayError> {
        match self.begin_login(conn_id, auth_token).await {
            Some(attempt) => self.finish_login(attempt).await,
            None => Ok(LoginOutcome::Ignored),
        }
    }

    pub(crate) fn decode(&self, data: &[u8]) -> Result<ClientMessage, ProtocolError> {
        self.codec.decode(data)
    }

    pub(crate) fn encode(&self, msg: &ServerMessage) -> Result<Vec<u8>, ProtocolError> {
        self.codec.encode(msg)
    }
}

impl<R> std::fmt::Debug for Gateway<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .field("stages", &self.pipeline.len())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

fn log_auth_failure(conn_id: ConnectionId, error: &AuthError) {
    match error {
        AuthError::ResolverUnavailable(_) => {
            tracing::warn!(%conn_id, error = %error, "credential store unavailable");
        }
        _ => {
            tracing::debug!(%conn_id, error = %error, "credential rejected");
        }
    }
}
