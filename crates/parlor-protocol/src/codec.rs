//! Codec trait and implementations for serializing/deserializing envelopes.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! Neither the transport nor the router cares HOW envelopes are
//! serialized — they just need something that implements [`Codec`].
//!
//! Currently we provide [`JsonCodec`], which matches the wire protocol's
//! JSON frames and the broker's JSON payloads. A binary codec could be
//! added later without touching any other code.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because codecs are shared across connection
/// tasks and live as long as the server.
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
    /// Returns [`ProtocolError::Decode`] if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// JSON is the protocol's native frame format — clients send JSON text
/// frames, and room topics carry the same JSON payloads so any relay
/// instance sharing the broker can decode them.
///
/// This is behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use parlor_protocol::{JsonCodec, Codec, ChatMessage};
///
/// let codec = JsonCodec;
/// let msg = ChatMessage::system("alice joined the room team", "team");
///
/// let bytes = codec.encode(&msg).unwrap();
/// let decoded: ChatMessage = codec.decode(&bytes).unwrap();
/// assert_eq!(msg, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
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
