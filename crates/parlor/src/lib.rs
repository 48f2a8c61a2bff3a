//! # Parlor
//!
//! Room-scoped chat relay over a pub/sub broker and a presence store.
//!
//! A Parlor instance accepts WebSocket clients, puts each one in a
//! room, and fans chat out through broker topics — one topic per room.
//! Because membership lives in a shared presence store and traffic in a
//! shared broker, several instances can serve one logical chat service;
//! the bundled in-memory broker and store make a single instance fully
//! self-contained.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use parlor::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ParlorError> {
//!     let server = ParlorServerBuilder::new()
//!         .bind("127.0.0.1:8080")
//!         .build(
//!             Arc::new(MemoryBroker::new()),
//!             Arc::new(MemoryStore::new()),
//!         )
//!         .await?;
//!     server.run().await
//! }
//! ```
//!
//! Clients connect to `ws://host:port/ws?username=NAME` and exchange
//! JSON envelopes; see `parlor-protocol` for the wire format.

mod config;
mod directory;
mod error;
mod server;
mod session;

pub use config::ServerConfig;
pub use error::ParlorError;
pub use server::{ParlorServer, ParlorServerBuilder};

/// Common imports for server binaries and tests.
pub mod prelude {
    pub use crate::{
        ParlorError, ParlorServer, ParlorServerBuilder, ServerConfig,
    };
    pub use parlor_presence::{
        MemoryStore, PresenceRegistry, PresenceStore,
    };
    pub use parlor_protocol::{
        ChatMessage, Codec, JsonCodec, MessageKind,
    };
    pub use parlor_router::{Broker, MemoryBroker, RoomRouter};
    pub use parlor_transport::{Connection, ConnectionId, Transport};
}
