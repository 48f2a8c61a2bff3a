//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Clients identify themselves in the connection URL:
//!
//! ```text
//! ws://host:port/ws?username=alice
//! ```
//!
//! The name is pulled out during the HTTP upgrade, so a connection
//! handed to the server already knows who it belongs to. A request
//! without a (non-empty) `username` parameter is refused with an
//! HTTP 400 and never becomes a WebSocket.

use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::StreamExt;
use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::StatusCode;

use crate::{Connection, ConnectionId, Transport, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

/// Extracts the `username` value from a request query string.
///
/// Query components arrive percent-encoded with `+` standing in for a
/// space; the name is stored decoded. Returns `None` when the
/// parameter is absent, empty, or not valid UTF-8 once decoded.
fn username_from_query(query: Option<&str>) -> Option<String> {
    let query = query?;
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("username=") {
            let value = value.replace('+', " ");
            let decoded = urlencoding::decode(&value).ok()?;
            if !decoded.is_empty() {
                return Some(decoded.into_owned());
            }
        }
    }
    None
}

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    /// Returns the address the listener is actually bound to.
    ///
    /// Useful when binding to port 0 and letting the OS pick.
    pub fn local_addr(
        &self,
    ) -> Result<std::net::SocketAddr, TransportError> {
        self.listener
            .local_addr()
            .map_err(TransportError::AcceptFailed)
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        // The upgrade callback runs synchronously during the handshake;
        // it smuggles the extracted name out through this local.
        let mut username: Option<String> = None;
        let callback = |req: &Request, resp: Response| {
            match username_from_query(req.uri().query()) {
                Some(name) => {
                    username = Some(name);
                    Ok(resp)
                }
                None => {
                    let mut reject = ErrorResponse::new(Some(
                        "missing username query parameter".to_string(),
                    ));
                    *reject.status_mut() = StatusCode::BAD_REQUEST;
                    Err(reject)
                }
            }
        };

        let ws = match tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
        {
            Ok(ws) => ws,
            Err(_) if username.is_none() => {
                tracing::warn!(%addr, "rejected connection without username");
                return Err(TransportError::MissingUsername);
            }
            Err(e) => return Err(TransportError::HandshakeFailed(e)),
        };

        // Unreachable in practice: the callback only accepts after
        // setting the name.
        let username =
            username.ok_or(TransportError::MissingUsername)?;

        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        tracing::debug!(%id, %addr, username, "accepted WebSocket connection");

        let (sink, stream) = ws.split();
        Ok(WebSocketConnection {
            id,
            username,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// A single WebSocket connection, tagged with its display name.
///
/// Sink and stream halves sit behind separate locks so a writer task
/// can push frames while another task blocks in [`recv`](Self::recv).
pub struct WebSocketConnection {
    id: ConnectionId,
    username: String,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        use futures_util::SinkExt;
        // Frames are JSON, so valid UTF-8; text frames keep browser and
        // CLI clients happy.
        let text = String::from_utf8_lossy(data).into_owned();
        self.sink
            .lock()
            .await
            .send(Message::text(text))
            .await
            .map_err(TransportError::SendFailed)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        loop {
            let msg = self.stream.lock().await.next().await;
            match msg {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(e));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        use futures_util::SinkExt;
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(TransportError::SendFailed)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn username(&self) -> &str {
        &self.username
    }
}
