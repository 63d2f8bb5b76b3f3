//! A development gateway backed by in-memory credential stores.
//!
//! ```text
//! BEACON_BIND=0.0.0.0:8080 RUST_LOG=debug cargo run -p dev-gateway
//! ```
//!
//! Connect with `ws://localhost:8080/?authToken=dev-token`, or with a
//! `sid=dev-session` cookie, or anonymously and then send
//! `{"type":"auth:login:token","payload":{"authToken":"dev-token"}}`.

use beacon::prelude::*;
use tracing_subscriber::EnvFilter;

const DEV_TOKEN: &str = "dev-token";
const DEV_SESSION: &str = "dev-session";

/// Stores seeded with one developer identity reachable by token and by
/// session.
async fn seed() -> (MemoryTokenStore, MemorySessionStore) {
    let developer = Identity::new("dev")
        .with_roles(["admin"])
        .with_attribute("name", "Developer");

    let tokens = MemoryTokenStore::new();
    tokens.insert_identity(developer.clone()).await;
    tokens.insert_token(TokenRecord::new(DEV_TOKEN, "dev")).await;

    let sessions = MemorySessionStore::new();
    sessions.insert(DEV_SESSION, developer).await;

    (tokens, sessions)
}

#[tokio::main]
async fn main() -> Result<(), GatewayError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = GatewayConfig::default();
    if let Ok(addr) = std::env::var("BEACON_BIND") {
        config.bind_addr = addr;
    }

    let (tokens, sessions) = seed().await;
    let server = GatewayServer::builder()
        .config(config.clone())
        .session_resolver(SessionResolver::new(sessions))
        .on_event(|event: &LifecycleEvent| {
            tracing::info!(
                kind = %event.kind,
                conn_id = %event.conn_id,
                identity_id = ?event.identity_id,
                "lifecycle"
            );
        })
        .build(TokenResolver::new(tokens, &config.auth))
        .await?;

    tracing::info!(addr = %config.bind_addr, "dev gateway listening");
    server.run().await
}
