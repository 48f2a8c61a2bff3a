//! Message routing layer for Parlor.
//!
//! Connects the pub/sub broker to per-session delivery:
//!
//! - **Broker** ([`Broker`] / [`BrokerSubscription`] traits,
//!   [`MemoryBroker`]) — topic-based fan-out, one topic per room.
//! - **Router** ([`RoomRouter`]) — membership operations (join, leave,
//!   switch) plus publishing, with one forwarder task per (room, user)
//!   pumping decoded envelopes into a [`DeliveryTarget`].
//!
//! The router is transport-agnostic: it sees connection IDs and
//! channels, never sockets. Multiple relay instances sharing a
//! networked broker and presence store form one logical chat service.

mod broker;
mod error;
mod memory;
mod router;

pub use broker::{Broker, BrokerError, BrokerSubscription};
pub use error::RouterError;
pub use memory::{MemoryBroker, MemorySubscription};
pub use router::{DeliveryTarget, RoomRouter, SwitchOutcome};
