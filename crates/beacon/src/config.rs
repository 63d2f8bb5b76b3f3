//! Gateway configuration.

use std::time::Duration;

use beacon_auth::AuthConfig;
use beacon_room::AdapterConfig;
use serde::Deserialize;

/// Top-level gateway settings.
///
/// Every field has a default, so `{}` is a valid configuration. Reading
/// the values from a file or the environment is left to the embedding
/// application.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the WebSocket listener binds to.
    ///
    /// Default: `127.0.0.1:8080`.
    pub bind_addr: String,

    /// Credential resolution settings.
    pub auth: AuthConfig,

    /// Milliseconds a connection may go without any inbound frame,
    /// pings and pongs included, before it is closed.
    ///
    /// Default: `None`. Liveness is left to the transport, which drops
    /// the connection when the peer goes away.
    pub idle_timeout_ms: Option<u64>,

    /// External broadcast adapter endpoint. `None` keeps rooms
    /// process-local.
    pub adapter: Option<AdapterConfig>,
}

impl GatewayConfig {
    /// The idle timeout, if one is set. Zero counts as unset.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            auth: AuthConfig::default(),
            idle_timeout_ms: None,
            adapter: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = GatewayConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.idle_timeout(), None);
        assert!(config.adapter.is_none());
        assert!(config.auth.session_enabled);
    }

    #[test]
    fn test_nested_sections_deserialize() {
        let config: GatewayConfig = serde_json::from_str(
            r#"{
                "bind_addr": "0.0.0.0:9000",
                "auth": { "session_enabled": false },
                "adapter": { "name": "redis", "options": { "url": "redis://bus" } }
            }"#,
        )
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert!(!config.auth.session_enabled);
        assert_eq!(config.auth.token_validity_secs, 3600);
        assert_eq!(config.idle_timeout_ms, None);

        let adapter = config.adapter.unwrap();
        assert_eq!(adapter.name, "redis");
        assert_eq!(adapter.options["url"], "redis://bus");
    }

    #[test]
    fn test_idle_timeout_in_millis() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{ "idle_timeout_ms": 250 }"#).unwrap();
        assert_eq!(config.idle_timeout(), Some(Duration::from_millis(250)));

        let config: GatewayConfig =
            serde_json::from_str(r#"{ "idle_timeout_ms": 0 }"#).unwrap();
        assert_eq!(config.idle_timeout(), None);
    }
}
