//! Per-connection handler: authentication, then message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Run the auth pipeline against the handshake while still reading,
//!      so a close during a slow lookup cancels registration
//!   2. Replay anything the client sent in the meantime
//!   3. Loop: forward outbound messages, dispatch inbound ones, close on
//!      idle timeout if one is configured

use std::sync::Arc;

use beacon_auth::CredentialResolver;
use beacon_protocol::ClientMessage;
use beacon_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::gateway::Gateway;
use crate::registry::ConnectOutcome;
use crate::GatewayError;

/// Drop guard that removes the connection when the handler exits.
///
/// Since `Drop` is synchronous, we spawn a fire-and-forget task for the
/// async lock.
struct ConnectionGuard<R: CredentialResolver> {
    conn_id: ConnectionId,
    gateway: Arc<Gateway<R>>,
}

impl<R: CredentialResolver> Drop for ConnectionGuard<R> {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let gateway = Arc::clone(&self.gateway);
        tokio::spawn(async move {
            gateway.close(conn_id).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<R: CredentialResolver>(
    conn: WebSocketConnection,
    gateway: Arc<Gateway<R>>,
) -> Result<(), GatewayError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let (tx, mut outbound) = mpsc::unbounded_channel();
    let _guard = ConnectionGuard {
        conn_id,
        gateway: Arc::clone(&gateway),
    };

    // --- Step 1: Authenticate ---
    let mut early = Vec::new();
    let opened = {
        let open = gateway.open(conn_id, conn.handshake().clone(), tx);
        tokio::pin!(open);
        loop {
            tokio::select! {
                result = &mut open => break Some(result),
                incoming = conn.recv() => match incoming {
                    Ok(Some(data)) => early.push(data),
                    Ok(None) => {
                        tracing::info!(%conn_id, "connection closed during authentication");
                        break None;
                    }
                    Err(e) => {
                        tracing::debug!(%conn_id, error = %e, "recv error");
                        break None;
                    }
                },
            }
        }
    };

    match opened {
        Some(Ok(ConnectOutcome::Registered { .. })) => {}
        Some(Ok(ConnectOutcome::Discarded)) | None => return Ok(()),
        Some(Err(e)) => {
            let _ = conn.close().await;
            return Err(e);
        }
    }

    // --- Step 2: Replay early messages ---
    for data in early {
        handle_inbound(&gateway, conn_id, &data).await;
    }

    // --- Step 3: Message loop ---
    let idle = gateway.config().idle_timeout();
    let mut deadline = idle.map(|idle| Instant::now() + idle);

    loop {
        tokio::select! {
            Some(msg) = outbound.recv() => {
                let bytes = gateway.encode(&msg)?;
                conn.send(&bytes).await?;
            }
            incoming = conn.recv() => match incoming {
                Ok(Some(data)) => handle_inbound(&gateway, conn_id, &data).await,
                Ok(None) => {
                    tracing::info!(%conn_id, "connection closed cleanly");
                    break;
                }
                Err(e) => {
                    tracing::debug!(%conn_id, error = %e, "recv error");
                    break;
                }
            },
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                if deadline.is_some() =>
            {
                // Keepalives never reach `recv`, so ask the transport.
                let Some(idle) = idle else { continue };
                let expires = Instant::from_std(conn.last_activity()) + idle;
                if expires > Instant::now() {
                    deadline = Some(expires);
                    continue;
                }
                tracing::info!(%conn_id, "connection timed out");
                let _ = conn.close().await;
                break;
            }
        }
    }

    // _guard drops here → registry disconnect fires.
    Ok(())
}

/// Decodes and dispatches one inbound frame.
///
/// Logins resolve on their own task so the handler keeps reading; a
/// close while the lookup is pending makes the registry discard it.
async fn handle_inbound<R: CredentialResolver>(
    gateway: &Arc<Gateway<R>>,
    conn_id: ConnectionId,
    data: &[u8],
) {
    match gateway.decode(data) {
        Ok(ClientMessage::LoginToken { auth_token }) => {
            let Some(attempt) = gateway.begin_login(conn_id, auth_token).await
            else {
                return;
            };
            let gateway = Arc::clone(gateway);
            tokio::spawn(async move {
                // Failures are logged by the gateway; the client gets no reply.
                let _ = gateway.finish_login(attempt).await;
            });
        }
        Err(e) => {
            tracing::debug!(%conn_id, error = %e, "dropping malformed message");
        }
    }
}
