//! Codec trait and the JSON implementation.
//!
//! The gateway never touches `serde_json` directly; it goes through a
//! [`Codec`] so a binary format can be swapped in later.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Encodes Rust values to bytes and decodes them back.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the bytes are malformed or
    /// don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use beacon_protocol::{ClientMessage, Codec, JsonCodec};
///
/// let msg: ClientMessage = JsonCodec
///     .decode(br#"{"type":"auth:login:token","payload":{"authToken":"t"}}"#)
///     .unwrap();
/// assert_eq!(
///     msg,
///     ClientMessage::LoginToken { auth_token: Some("t".into()) }
/// );
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientMessage;

    #[test]
    fn test_decode_malformed_json_returns_decode_error() {
        let result: Result<ClientMessage, _> = JsonCodec.decode(b"{nope");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_unknown_type_returns_decode_error() {
        let result: Result<ClientMessage, _> =
            JsonCodec.decode(br#"{"type":"chat:send","payload":{}}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_encode_produces_utf8_json() {
        let bytes = JsonCodec.encode(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), r#"{"a":1}"#);
    }
}
