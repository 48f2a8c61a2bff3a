//! The [`RoomRouter`] — room membership and message fan-out.
//!
//! The router is the meeting point of the three lower layers: it
//! subscribes broker topics, records membership in the presence
//! registry, and forwards decoded envelopes into per-session delivery
//! channels. One forwarder task runs per (room, user) pair.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use parlor_presence::{PresenceRegistry, PresenceStore};
use parlor_protocol::{ChatMessage, Codec};
use parlor_transport::ConnectionId;

use crate::{Broker, BrokerSubscription, RouterError};

/// Broker topic carrying one room's traffic.
fn room_topic(room: &str) -> String {
    format!("chat.room.{room}")
}

fn require_name(value: &str, what: &str) -> Result<(), RouterError> {
    if value.trim().is_empty() {
        return Err(RouterError::InvalidArgument(format!(
            "{what} must not be empty"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// DeliveryTarget
// ---------------------------------------------------------------------------

/// Where decoded room traffic for one session should go.
///
/// A bounded channel into the session's writer task. Delivery never
/// blocks the forwarder: when the queue is full the message is dropped
/// and logged, so one stalled client can't back up a whole room.
#[derive(Debug, Clone)]
pub struct DeliveryTarget {
    session: ConnectionId,
    sender: mpsc::Sender<ChatMessage>,
}

impl DeliveryTarget {
    /// Creates a target feeding the given session's outbound queue.
    pub fn new(
        session: ConnectionId,
        sender: mpsc::Sender<ChatMessage>,
    ) -> Self {
        Self { session, sender }
    }

    /// The session this target delivers to.
    pub fn session(&self) -> ConnectionId {
        self.session
    }

    /// Hands a message to the session. Returns `false` when the session
    /// is gone and the forwarder should stop.
    fn deliver(&self, msg: ChatMessage) -> bool {
        match self.sender.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                tracing::warn!(
                    session = %self.session,
                    kind = %dropped.kind,
                    "outbound queue full, dropping message"
                );
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// SwitchOutcome
// ---------------------------------------------------------------------------

/// Result of a completed [`RoomRouter::switch_room`].
///
/// A switch is leave-then-join, and the join can fail after the leave
/// has already happened. The router then tries to put the user back in
/// the old room; this enum says where the user actually ended up.
#[derive(Debug)]
pub enum SwitchOutcome {
    /// The user is in the new room.
    Switched,

    /// Joining the new room failed; the user was rejoined to the old
    /// room and is back where they started.
    RolledBack {
        /// Why the new room could not be joined.
        reason: RouterError,
    },

    /// Joining the new room failed AND the rejoin failed too. The user
    /// is in no room at all and must issue a fresh join.
    Stranded {
        /// Why the new room could not be joined.
        reason: RouterError,
        /// Why the rejoin to the old room failed.
        rollback: RouterError,
    },
}

// ---------------------------------------------------------------------------
// RoomRouter
// ---------------------------------------------------------------------------

#[derive(Debug, Hash, PartialEq, Eq)]
struct SubKey {
    room: String,
    user: String,
}

impl SubKey {
    fn new(room: &str, user: &str) -> Self {
        Self {
            room: room.to_string(),
            user: user.to_string(),
        }
    }
}

/// A running forwarder for one (room, user) pair.
struct RoomSubscription {
    forwarder: JoinHandle<()>,
}

/// Routes room traffic between the broker, the presence registry, and
/// per-session delivery channels.
///
/// Membership operations (join / leave / switch) serialize on one
/// internal lock, so a session issuing commands quickly never observes
/// them interleaved. Publishing and forwarding don't take that lock.
pub struct RoomRouter<B: Broker, S, C> {
    broker: Arc<B>,
    registry: PresenceRegistry<S>,
    codec: C,
    subs: Mutex<HashMap<SubKey, RoomSubscription>>,
}

impl<B, S, C> RoomRouter<B, S, C>
where
    B: Broker,
    S: PresenceStore,
    C: Codec + Clone,
{
    /// Creates a router over the given broker and presence registry.
    pub fn new(
        broker: Arc<B>,
        registry: PresenceRegistry<S>,
        codec: C,
    ) -> Self {
        Self {
            broker,
            registry,
            codec,
            subs: Mutex::new(HashMap::new()),
        }
    }

    /// Puts a user in a room.
    ///
    /// Subscribes the room's topic, records membership, starts a
    /// forwarder feeding `target`, and announces the arrival to the
    /// room. Joining a room the user is already in is a no-op.
    ///
    /// # Errors
    ///
    /// Steps run in order: membership write, topic subscription,
    /// arrival notice. A failure is reported to the caller but earlier
    /// steps are NOT rolled back — a failed join can leave a membership
    /// record with no live subscription behind it. Disconnect teardown
    /// and the next explicit leave correct it.
    pub async fn join(
        &self,
        room: &str,
        user: &str,
        target: DeliveryTarget,
    ) -> Result<(), RouterError> {
        require_name(room, "room")?;
        require_name(user, "user")?;

        let mut subs = self.subs.lock().await;
        let key = SubKey::new(room, user);
        if subs.contains_key(&key) {
            tracing::debug!(%room, user, "already in room, ignoring join");
            return Ok(());
        }

        self.registry.add_member(room, user).await?;
        let sub = self.broker.subscribe(&room_topic(room)).await?;

        let forwarder = self.spawn_forwarder(sub, room, user, target);
        subs.insert(key, RoomSubscription { forwarder });
        tracing::info!(%room, user, "user joined room");

        let notice = ChatMessage::system(
            format!("{user} joined the room {room}"),
            room,
        );
        self.publish_to(room, &notice).await
    }

    /// Takes a user out of a room.
    ///
    /// Announces the departure, stops the forwarder, and removes the
    /// membership record. Leaving a room the user is not in is a no-op.
    /// A failed announcement is logged, not returned — the user leaves
    /// either way.
    pub async fn leave(
        &self,
        room: &str,
        user: &str,
    ) -> Result<(), RouterError> {
        require_name(room, "room")?;
        require_name(user, "user")?;

        let mut subs = self.subs.lock().await;
        let Some(sub) = subs.remove(&SubKey::new(room, user)) else {
            tracing::debug!(%room, user, "not in room, ignoring leave");
            return Ok(());
        };

        let notice =
            ChatMessage::system(format!("{user} left the room"), room);
        if let Err(e) = self.publish_to(room, &notice).await {
            tracing::warn!(%room, user, error = %e, "leave notice failed");
        }

        sub.forwarder.abort();
        self.registry.remove_member(room, user).await?;
        tracing::info!(%room, user, "user left room");
        Ok(())
    }

    /// Moves a user from one room to another.
    ///
    /// Leave-then-join. If the join fails the router tries to rejoin
    /// the old room; the returned [`SwitchOutcome`] says where the user
    /// ended up. An `Err` means the initial leave failed and nothing
    /// changed.
    pub async fn switch_room(
        &self,
        from: &str,
        to: &str,
        user: &str,
        target: DeliveryTarget,
    ) -> Result<SwitchOutcome, RouterError> {
        self.leave(from, user).await?;

        match self.join(to, user, target.clone()).await {
            Ok(()) => Ok(SwitchOutcome::Switched),
            Err(reason) => {
                tracing::warn!(
                    from, to, user, error = %reason,
                    "switch failed, rejoining previous room"
                );
                match self.join(from, user, target).await {
                    Ok(()) => Ok(SwitchOutcome::RolledBack { reason }),
                    Err(rollback) => {
                        tracing::error!(
                            from, user, error = %rollback,
                            "rejoin failed, user is in no room"
                        );
                        Ok(SwitchOutcome::Stranded { reason, rollback })
                    }
                }
            }
        }
    }

    /// Publishes an envelope to its room's topic.
    ///
    /// The envelope must carry a room; chat messages are stamped with
    /// the sender's current room before they get here.
    pub async fn publish(
        &self,
        msg: &ChatMessage,
    ) -> Result<(), RouterError> {
        let room = msg.room.as_deref().ok_or(RouterError::MissingRoom)?;
        self.publish_to(room, msg).await
    }

    /// Returns whether a forwarder is running for this (room, user).
    pub async fn is_subscribed(&self, room: &str, user: &str) -> bool {
        self.subs
            .lock()
            .await
            .contains_key(&SubKey::new(room, user))
    }

    /// Stops every forwarder. Membership records are left alone; the
    /// server clears presence on its next startup.
    pub async fn shutdown(&self) {
        let mut subs = self.subs.lock().await;
        let count = subs.len();
        for (_, sub) in subs.drain() {
            sub.forwarder.abort();
        }
        tracing::info!(count, "room router shut down");
    }

    async fn publish_to(
        &self,
        room: &str,
        msg: &ChatMessage,
    ) -> Result<(), RouterError> {
        let payload = self.codec.encode(msg)?;
        self.broker.publish(&room_topic(room), &payload).await?;
        Ok(())
    }

    /// Spawns the task that pumps one subscription into one session.
    fn spawn_forwarder(
        &self,
        mut sub: B::Subscription,
        room: &str,
        user: &str,
        target: DeliveryTarget,
    ) -> JoinHandle<()> {
        let codec = self.codec.clone();
        let room = room.to_string();
        let user = user.to_string();

        tokio::spawn(async move {
            loop {
                match sub.next().await {
                    Ok(Some(payload)) => {
                        let msg: ChatMessage = match codec.decode(&payload)
                        {
                            Ok(msg) => msg,
                            Err(e) => {
                                tracing::warn!(
                                    %room, error = %e,
                                    "undecodable payload on room topic"
                                );
                                continue;
                            }
                        };

                        // Echo suppression: the author's client already
                        // shows their own words. System notices carry
                        // no sender and pass through.
                        if msg.sender.as_deref() == Some(user.as_str()) {
                            continue;
                        }

                        if !target.deliver(msg) {
                            tracing::debug!(
                                %room, user,
                                "session gone, stopping forwarder"
                            );
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(
                            %room, user, error = %e,
                            "subscription failed"
                        );
                        break;
                    }
                }
            }
        })
    }
}
