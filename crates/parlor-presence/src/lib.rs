//! Presence layer for Parlor.
//!
//! Tracks who is connected and which room each user occupies, backed by
//! a pluggable set store:
//!
//! - **Store** ([`PresenceStore`] trait, [`MemoryStore`]) — a minimal
//!   named-set interface, shaped like the handful of Redis set commands
//!   a production deployment would use.
//! - **Registry** ([`PresenceRegistry`]) — the chat-level vocabulary
//!   (active users, room membership, known rooms) built on those sets.
//!
//! The registry owns the key schema; nothing outside this crate knows
//! how presence data is laid out in the store.

mod error;
mod memory;
mod registry;
mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use registry::PresenceRegistry;
pub use store::PresenceStore;
