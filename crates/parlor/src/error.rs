//! Unified error type for the Parlor server.

use parlor_presence::StoreError;
use parlor_protocol::ProtocolError;
use parlor_router::RouterError;
use parlor_transport::TransportError;

/// Top-level error that wraps all layer-specific errors.
///
/// When using the `parlor` crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ParlorError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid envelope).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A presence-store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A routing error (broker, membership, publish).
    #[error(transparent)]
    Router(#[from] RouterError),

    /// Reading a configuration file failed.
    #[error("config file {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A configuration file didn't parse.
    #[error("config file {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
