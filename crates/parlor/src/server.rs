//! `ParlorServer` builder and server loop.
//!
//! This is the entry point for running a Parlor relay instance. It ties
//! together all the layers: transport → protocol → session → router.

use std::future::Future;
use std::sync::Arc;

use parlor_presence::{PresenceRegistry, PresenceStore};
use parlor_protocol::{ChatMessage, Codec, JsonCodec, MessageKind};
use parlor_router::{Broker, RoomRouter};
use parlor_transport::{Transport, TransportError, WebSocketTransport};

use crate::directory::SessionDirectory;
use crate::session::handle_connection;
use crate::{ParlorError, ServerConfig};

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks.
pub(crate) struct ServerState<B: Broker, S, C> {
    pub(crate) router: RoomRouter<B, S, C>,
    pub(crate) registry: PresenceRegistry<S>,
    pub(crate) directory: SessionDirectory,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting a Parlor server.
///
/// # Example
///
/// ```rust,ignore
/// use parlor::prelude::*;
///
/// let server = ParlorServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .build(broker, store)
///     .await?;
/// server.run().await
/// ```
pub struct ParlorServerBuilder {
    config: ServerConfig,
}

impl ParlorServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the room new connections land in.
    pub fn default_room(mut self, room: &str) -> Self {
        self.config.default_room = room.to_string();
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the server over the given broker and presence store.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`. Clears the active-user
    /// set first: names left behind by an unclean shutdown would lock
    /// their owners out.
    pub async fn build<B: Broker, S: PresenceStore>(
        self,
        broker: Arc<B>,
        store: Arc<S>,
    ) -> Result<ParlorServer<B, S, JsonCodec>, ParlorError> {
        let transport =
            WebSocketTransport::bind(&self.config.bind_addr).await?;

        let registry = PresenceRegistry::new(store);
        registry.clear_active().await?;

        let router =
            RoomRouter::new(broker, registry.clone(), JsonCodec);

        let state = Arc::new(ServerState {
            router,
            registry,
            directory: SessionDirectory::new(),
            codec: JsonCodec,
            config: self.config,
        });

        Ok(ParlorServer { transport, state })
    }
}

impl Default for ParlorServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Parlor relay instance.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ParlorServer<B: Broker, S, C> {
    transport: WebSocketTransport,
    state: Arc<ServerState<B, S, C>>,
}

impl<B, S, C> ParlorServer<B, S, C>
where
    B: Broker,
    S: PresenceStore,
    C: Codec + Clone,
{
    /// Creates a new builder.
    pub fn builder() -> ParlorServerBuilder {
        ParlorServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(
        &self,
    ) -> Result<std::net::SocketAddr, ParlorError> {
        self.transport.local_addr().map_err(Into::into)
    }

    /// Runs the server accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), ParlorError> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Runs the server until `signal` completes, then shuts down
    /// gracefully: announce, close every session, stop the router.
    pub async fn serve_with_shutdown(
        mut self,
        signal: impl Future<Output = ()>,
    ) -> Result<(), ParlorError> {
        tracing::info!("Parlor server running");

        tokio::select! {
            _ = accept_loop(&mut self.transport, &self.state) => {}
            _ = signal => {
                tracing::info!("shutdown signal received");
            }
        }

        let sessions = self.state.directory.len().await;
        tracing::info!(sessions, "draining sessions");

        let notice = ChatMessage::response(
            MessageKind::System,
            "server shutting down",
        );
        self.state.directory.broadcast(&notice).await;
        self.state.directory.close_all().await;
        self.state.router.shutdown().await;
        self.transport.shutdown().await?;
        Ok(())
    }
}

/// Accepts connections forever, spawning a session task for each.
async fn accept_loop<B, S, C>(
    transport: &mut WebSocketTransport,
    state: &Arc<ServerState<B, S, C>>,
) where
    B: Broker,
    S: PresenceStore,
    C: Codec + Clone,
{
    loop {
        match transport.accept().await {
            Ok(conn) => {
                let state = Arc::clone(state);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(conn, state).await {
                        tracing::debug!(
                            error = %e,
                            "connection ended with error"
                        );
                    }
                });
            }
            Err(TransportError::MissingUsername) => {
                // Already rejected with an HTTP 400; nothing to do.
            }
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
            }
        }
    }
}
