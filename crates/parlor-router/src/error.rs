use parlor_presence::StoreError;
use parlor_protocol::ProtocolError;

use crate::BrokerError;

/// Errors that can occur while routing room traffic.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// A room or user name failed validation (empty).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A chat envelope reached the router without a room. The session
    /// layer stamps the sender's current room first, so this means a
    /// caller skipped that step.
    #[error("chat message has no room")]
    MissingRoom,

    /// The pub/sub broker failed.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The presence store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Encoding or decoding a payload failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
