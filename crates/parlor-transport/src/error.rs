/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Binding the listener or accepting a TCP connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The WebSocket handshake failed after the TCP accept.
    #[cfg(feature = "websocket")]
    #[error("handshake failed: {0}")]
    HandshakeFailed(#[source] tokio_tungstenite::tungstenite::Error),

    /// The client did not present a username during the handshake.
    /// The handshake is rejected with an HTTP 400 before this is
    /// returned, so the client sees the reason too.
    #[error("handshake rejected: missing username")]
    MissingUsername,

    /// Sending a frame failed.
    #[cfg(feature = "websocket")]
    #[error("send failed: {0}")]
    SendFailed(#[source] tokio_tungstenite::tungstenite::Error),

    /// Receiving a frame failed.
    #[cfg(feature = "websocket")]
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] tokio_tungstenite::tungstenite::Error),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
