//! In-band messages exchanged over an open connection.
//!
//! Every frame is adjacently tagged:
//!
//! ```json
//! { "type": "auth:login:token", "payload": { "authToken": "..." } }
//! ```

use serde::{Deserialize, Serialize};

use crate::{Identity, RoomName};

/// Client → gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    /// Authenticate (or re-authenticate) this connection with a bearer
    /// token. A missing or empty token is ignored.
    #[serde(rename = "auth:login:token")]
    LoginToken {
        #[serde(rename = "authToken", default)]
        auth_token: Option<String>,
    },
}

/// Gateway → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// In-band authentication succeeded. Echoes the credential back.
    #[serde(rename = "auth:authenticated")]
    Authenticated {
        identity: Identity,
        credential: String,
    },

    /// An application event delivered through a room. The gateway does
    /// not interpret `data`.
    #[serde(rename = "room:event")]
    RoomEvent {
        room: RoomName,
        event: String,
        data: serde_json::Value,
    },
}
