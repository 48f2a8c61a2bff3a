//! Wire protocol for Parlor.
//!
//! This crate defines the "language" that chat clients and the relay
//! server speak:
//!
//! - **Types** ([`ChatMessage`], [`MessageKind`]) — the envelope that
//!   travels on the wire and between server components.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how envelopes are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the
//! session/router layers (chat semantics). It doesn't know about
//! connections, rooms, or presence — it only knows how to serialize
//! and deserialize envelopes.
//!
//! ```text
//! Transport (bytes) → Protocol (ChatMessage) → Session / Room Router
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{ChatMessage, MessageKind};
