//! The [`SessionDirectory`] — this instance's live connections.
//!
//! The presence registry is the shared (possibly cross-instance) view
//! of who exists; the directory is strictly local plumbing: for each
//! connection on THIS instance, the outbound queue feeding its writer
//! task and the handle used to shut it down.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify, mpsc};

use parlor_protocol::ChatMessage;
use parlor_transport::ConnectionId;

struct SessionHandle {
    name: String,
    outbound: mpsc::Sender<ChatMessage>,
    shutdown: Arc<Notify>,
}

/// Registry of sessions hosted by this instance.
#[derive(Default)]
pub(crate) struct SessionDirectory {
    sessions: Mutex<HashMap<ConnectionId, SessionHandle>>,
}

impl SessionDirectory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a session and returns the handle its task should wait
    /// on for server-initiated shutdown.
    pub(crate) async fn register(
        &self,
        id: ConnectionId,
        name: &str,
        outbound: mpsc::Sender<ChatMessage>,
    ) -> Arc<Notify> {
        let shutdown = Arc::new(Notify::new());
        self.sessions.lock().await.insert(
            id,
            SessionHandle {
                name: name.to_string(),
                outbound,
                shutdown: Arc::clone(&shutdown),
            },
        );
        shutdown
    }

    /// Removes a session. Idempotent.
    pub(crate) async fn deregister(&self, id: ConnectionId) {
        self.sessions.lock().await.remove(&id);
    }

    /// Number of live sessions on this instance.
    pub(crate) async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Queues a message to every session on this instance, bypassing
    /// the broker. Used for instance-local announcements like shutdown.
    pub(crate) async fn broadcast(&self, msg: &ChatMessage) {
        for (id, handle) in self.sessions.lock().await.iter() {
            if handle.outbound.try_send(msg.clone()).is_err() {
                tracing::debug!(
                    session = %id,
                    name = %handle.name,
                    "broadcast skipped session"
                );
            }
        }
    }

    /// Tells every session task to wind down.
    pub(crate) async fn close_all(&self) {
        let sessions = self.sessions.lock().await;
        for handle in sessions.values() {
            handle.shutdown.notify_one();
        }
        tracing::info!(count = sessions.len(), "closing all sessions");
    }
}
