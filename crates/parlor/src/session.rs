//! Per-connection session: admission, command dispatch, and teardown.
//!
//! Each accepted connection gets its own Tokio task running
//! [`handle_connection`]. The flow is:
//!   1. Admission — reject the connection if its display name is taken
//!   2. Start the writer task and join the default room
//!   3. Loop: receive envelopes → dispatch by kind
//!   4. Teardown — leave the room, release the name, close the socket
//!
//! A session tracks exactly one `current_room`. It becomes `None` only
//! when a room switch strands the user; from then on chat messages are
//! refused until the client issues a fresh `join_room`.

use std::sync::Arc;

use tokio::sync::mpsc;

use parlor_presence::PresenceStore;
use parlor_protocol::{ChatMessage, Codec, MessageKind};
use parlor_router::{Broker, DeliveryTarget, SwitchOutcome};
use parlor_transport::{Connection, WebSocketConnection};

use crate::ParlorError;
use crate::server::ServerState;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<B, S, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<B, S, C>>,
) -> Result<(), ParlorError>
where
    B: Broker,
    S: PresenceStore,
    C: Codec + Clone,
{
    let conn_id = conn.id();
    let username = conn.username().to_string();
    tracing::debug!(%conn_id, username, "handling new connection");

    // --- Admission: one connection per display name ---
    // Check-then-claim: two simultaneous connections can both pass the
    // check and share a name. Accepted — the cost is a duplicated name,
    // not corrupted state.
    if state.registry.is_active(&username).await? {
        let rejection =
            state.codec.encode(&ChatMessage::username_exists())?;
        let _ = conn.send(&rejection).await;
        let _ = conn.close().await;
        tracing::info!(username, "rejected duplicate username");
        return Ok(());
    }
    state.registry.add_active(&username).await?;

    let conn = Arc::new(conn);
    let (outbound_tx, mut outbound_rx) =
        mpsc::channel::<ChatMessage>(state.config.outbound_queue);
    let shutdown = state
        .directory
        .register(conn_id, &username, outbound_tx.clone())
        .await;

    // Writer task: sole writer to the socket from here on. Everything
    // outgoing — room traffic, command replies, notices — goes through
    // the outbound queue.
    let writer_conn = Arc::clone(&conn);
    let writer_codec = state.codec.clone();
    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let bytes = match writer_codec.encode(&msg) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping unencodable message");
                    continue;
                }
            };
            if writer_conn.send(&bytes).await.is_err() {
                break;
            }
        }
    });

    let target = DeliveryTarget::new(conn_id, outbound_tx.clone());

    // --- Everyone starts in the default room ---
    let default_room = state.config.default_room.clone();
    let mut current_room: Option<String> = match state
        .router
        .join(&default_room, &username, target.clone())
        .await
    {
        Ok(()) => Some(default_room),
        Err(e) => {
            tracing::error!(
                username, error = %e,
                "failed to join default room"
            );
            // The join may have gotten as far as inserting the
            // subscription before failing; leave tears down whatever
            // it left behind, so a reconnect under this name starts
            // clean instead of hitting the idempotency check.
            if let Err(leave_err) =
                state.router.leave(&default_room, &username).await
            {
                tracing::warn!(
                    username, error = %leave_err,
                    "cleanup leave after failed join"
                );
            }
            state.directory.deregister(conn_id).await;
            if let Err(e) = state.registry.remove_active(&username).await {
                tracing::warn!(username, error = %e, "active flag leak");
            }
            let _ = conn.close().await;
            writer.abort();
            return Err(e.into());
        }
    };

    tracing::info!(
        %conn_id, username, room = %state.config.default_room,
        "session started"
    );

    // --- Message loop ---
    loop {
        let data = tokio::select! {
            _ = shutdown.notified() => {
                tracing::debug!(username, "session shutting down");
                break;
            }
            result = conn.recv() => match result {
                Ok(Some(data)) => data,
                Ok(None) => {
                    tracing::info!(username, "connection closed cleanly");
                    break;
                }
                Err(e) => {
                    tracing::debug!(username, error = %e, "recv error");
                    break;
                }
            },
        };

        let msg: ChatMessage = match state.codec.decode(&data) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(
                    username, error = %e,
                    "undecodable frame, skipping"
                );
                continue;
            }
        };

        match msg.kind {
            MessageKind::Chat => {
                handle_chat(
                    &state,
                    &username,
                    &current_room,
                    msg,
                    &outbound_tx,
                )
                .await?;
            }
            MessageKind::JoinRoom => {
                let Some(room) = msg.room.filter(|r| !r.is_empty())
                else {
                    notify(
                        &outbound_tx,
                        "join_room requires a room name",
                    )
                    .await;
                    continue;
                };
                move_to(
                    &state,
                    &username,
                    &mut current_room,
                    &target,
                    &room,
                    &outbound_tx,
                )
                .await?;
            }
            MessageKind::LeaveRoom => {
                let room = state.config.default_room.clone();
                move_to(
                    &state,
                    &username,
                    &mut current_room,
                    &target,
                    &room,
                    &outbound_tx,
                )
                .await?;
            }
            MessageKind::ListUsers => {
                // A store hiccup must not kill the session; the loop
                // carries on so teardown still runs on disconnect.
                let listed = match msg.room.as_deref() {
                    Some(room) if !room.is_empty() => {
                        state.registry.list_members(room).await
                    }
                    _ => state.registry.list_active().await,
                };
                match listed {
                    Ok(names) => {
                        let reply = ChatMessage::response(
                            MessageKind::ListUsersResponse,
                            names.join(", "),
                        );
                        queue(&outbound_tx, reply).await;
                    }
                    Err(e) => {
                        tracing::warn!(
                            username, error = %e,
                            "list_users failed"
                        );
                        notify(&outbound_tx, "user list is unavailable")
                            .await;
                    }
                }
            }
            MessageKind::ListRooms => {
                match state.registry.list_rooms().await {
                    Ok(rooms) => {
                        let reply = ChatMessage::response(
                            MessageKind::ListRoomsResponse,
                            rooms.join(", "),
                        );
                        queue(&outbound_tx, reply).await;
                    }
                    Err(e) => {
                        tracing::warn!(
                            username, error = %e,
                            "list_rooms failed"
                        );
                        notify(&outbound_tx, "room list is unavailable")
                            .await;
                    }
                }
            }
            other => {
                tracing::debug!(
                    username, kind = %other,
                    "ignoring client envelope"
                );
            }
        }
    }

    // --- Teardown: best-effort, every step runs ---
    if let Some(room) = &current_room {
        if let Err(e) = state.router.leave(room, &username).await {
            tracing::warn!(
                username, %room, error = %e,
                "leave on disconnect failed"
            );
        }
    }
    if let Err(e) = state.registry.remove_active(&username).await {
        tracing::warn!(username, error = %e, "failed to release name");
    }
    state.directory.deregister(conn_id).await;
    let _ = conn.close().await;
    writer.abort();

    tracing::info!(%conn_id, username, "session ended");
    Ok(())
}

/// Stamps and publishes a chat envelope to the sender's room.
async fn handle_chat<B, S, C>(
    state: &Arc<ServerState<B, S, C>>,
    username: &str,
    current_room: &Option<String>,
    mut msg: ChatMessage,
    outbound: &mpsc::Sender<ChatMessage>,
) -> Result<(), ParlorError>
where
    B: Broker,
    S: PresenceStore,
    C: Codec + Clone,
{
    // The server owns attribution: whatever the client claimed, the
    // message is from this session's name, timestamped now.
    msg.sender = Some(username.to_string());
    msg.timestamp = Some(ChatMessage::now());
    if msg.room.is_none() {
        msg.room = current_room.clone();
    }

    if msg.room.is_none() {
        notify(outbound, "you are not in a room; send join_room first")
            .await;
        return Ok(());
    }

    if let Err(e) = state.router.publish(&msg).await {
        tracing::warn!(username, error = %e, "chat publish failed");
        notify(outbound, "message could not be delivered").await;
    }
    Ok(())
}

/// Moves a session to `room`, updating `current_room` to wherever the
/// user actually ended up.
async fn move_to<B, S, C>(
    state: &Arc<ServerState<B, S, C>>,
    username: &str,
    current_room: &mut Option<String>,
    target: &DeliveryTarget,
    room: &str,
    outbound: &mpsc::Sender<ChatMessage>,
) -> Result<(), ParlorError>
where
    B: Broker,
    S: PresenceStore,
    C: Codec + Clone,
{
    if current_room.as_deref() == Some(room) {
        tracing::debug!(username, %room, "already there, ignoring move");
        return Ok(());
    }

    match current_room.take() {
        Some(previous) => {
            match state
                .router
                .switch_room(&previous, room, username, target.clone())
                .await
            {
                Ok(SwitchOutcome::Switched) => {
                    *current_room = Some(room.to_string());
                }
                Ok(SwitchOutcome::RolledBack { reason }) => {
                    *current_room = Some(previous.clone());
                    notify(
                        outbound,
                        &format!(
                            "could not join {room}: {reason}; \
                             still in {previous}"
                        ),
                    )
                    .await;
                }
                Ok(SwitchOutcome::Stranded { reason, rollback }) => {
                    // current_room stays None: the client must issue a
                    // fresh join_room before chatting again.
                    tracing::error!(
                        username, %room,
                        error = %reason, rollback = %rollback,
                        "switch stranded session"
                    );
                    notify(
                        outbound,
                        &format!(
                            "could not join {room}: {reason}; \
                             you are no longer in a room, \
                             send join_room to continue"
                        ),
                    )
                    .await;
                }
                Err(e) => {
                    // The leave itself failed; nothing changed.
                    *current_room = Some(previous.clone());
                    tracing::warn!(
                        username, %room, error = %e,
                        "room switch refused"
                    );
                    notify(
                        outbound,
                        &format!("could not leave {previous}: {e}"),
                    )
                    .await;
                }
            }
        }
        None => {
            match state.router.join(room, username, target.clone()).await
            {
                Ok(()) => *current_room = Some(room.to_string()),
                Err(e) => {
                    tracing::warn!(
                        username, %room, error = %e,
                        "join failed"
                    );
                    notify(
                        outbound,
                        &format!("could not join {room}: {e}"),
                    )
                    .await;
                }
            }
        }
    }
    Ok(())
}

/// Queues a system notice addressed to this session only.
async fn notify(outbound: &mpsc::Sender<ChatMessage>, content: &str) {
    let msg =
        ChatMessage::response(MessageKind::System, content.to_string());
    queue(outbound, msg).await;
}

async fn queue(
    outbound: &mpsc::Sender<ChatMessage>,
    msg: ChatMessage,
) {
    if outbound.send(msg).await.is_err() {
        tracing::debug!("session outbound closed, reply dropped");
    }
}
