//! Error types for the protocol layer.
//!
//! Each crate in Parlor defines its own error enum. When you see a
//! `ProtocolError`, the problem is in serialization/deserialization —
//! not in networking, presence, or routing.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, a missing `type` field, wrong
    /// data types, or truncated frames.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The envelope is invalid at the protocol level — it parsed, but
    /// violates a rule (e.g., a chat envelope with no room by the time
    /// it reaches the router).
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),
}
