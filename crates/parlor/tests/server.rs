//! Integration tests for the Parlor server: full connection flow over
//! real WebSockets, with the in-memory broker and store behind it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parlor::prelude::*;
use parlor_presence::StoreError;
use parlor_router::BrokerError;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a server on a random port over the given backends and
/// returns the address.
async fn start_server_with<B: Broker, S: PresenceStore>(
    broker: Arc<B>,
    store: Arc<S>,
) -> String {
    let server = ParlorServerBuilder::new()
        .bind("127.0.0.1:0")
        .build(broker, store)
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

/// Starts a server over the in-memory broker and store.
async fn start_server() -> String {
    start_server_with(
        Arc::new(MemoryBroker::new()),
        Arc::new(MemoryStore::new()),
    )
    .await
}

/// Store wrapper that refuses `members` lookups on chosen sets.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    deny_members: Mutex<HashSet<String>>,
}

impl FlakyStore {
    fn deny_members(&self, set: &str) {
        self.deny_members.lock().unwrap().insert(set.to_string());
    }
}

impl PresenceStore for FlakyStore {
    async fn add(&self, set: &str, member: &str) -> Result<(), StoreError> {
        self.inner.add(set, member).await
    }

    async fn remove(
        &self,
        set: &str,
        member: &str,
    ) -> Result<(), StoreError> {
        self.inner.remove(set, member).await
    }

    async fn contains(
        &self,
        set: &str,
        member: &str,
    ) -> Result<bool, StoreError> {
        self.inner.contains(set, member).await
    }

    async fn members(&self, set: &str) -> Result<Vec<String>, StoreError> {
        if self.deny_members.lock().unwrap().contains(set) {
            return Err(StoreError::Unavailable(
                "injected failure".to_string(),
            ));
        }
        self.inner.members(set).await
    }

    async fn delete(&self, set: &str) -> Result<(), StoreError> {
        self.inner.delete(set).await
    }
}

/// Broker wrapper that refuses publishes on chosen topics.
#[derive(Default)]
struct GatedBroker {
    inner: MemoryBroker,
    deny_publish: Mutex<HashSet<String>>,
}

impl GatedBroker {
    fn deny_publish(&self, topic: &str) {
        self.deny_publish.lock().unwrap().insert(topic.to_string());
    }

    fn allow_publish(&self, topic: &str) {
        self.deny_publish.lock().unwrap().remove(topic);
    }
}

impl Broker for GatedBroker {
    type Subscription = <MemoryBroker as Broker>::Subscription;

    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), BrokerError> {
        if self.deny_publish.lock().unwrap().contains(topic) {
            return Err(BrokerError::PublishFailed {
                topic: topic.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.inner.publish(topic, payload).await
    }

    async fn subscribe(
        &self,
        topic: &str,
    ) -> Result<Self::Subscription, BrokerError> {
        self.inner.subscribe(topic).await
    }
}

async fn connect(addr: &str, username: &str) -> ClientWs {
    let url = format!("ws://{addr}/ws?username={username}");
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("should connect");
    ws
}

fn encode(msg: &ChatMessage) -> Message {
    Message::text(serde_json::to_string(msg).expect("encode"))
}

/// Receives the next envelope, failing the test on timeout or close.
async fn recv(ws: &mut ClientWs) -> ChatMessage {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out waiting for server")
        .expect("stream ended")
        .expect("websocket error");
    serde_json::from_slice(&msg.into_data()).expect("decode")
}

/// Receives envelopes until one of the given kind arrives, skipping
/// others (system notices interleave freely with command replies).
async fn recv_kind(ws: &mut ClientWs, kind: MessageKind) -> ChatMessage {
    for _ in 0..10 {
        let msg = recv(ws).await;
        if msg.kind == kind {
            return msg;
        }
    }
    panic!("no {kind} envelope within 10 messages");
}

/// Receives system notices until one contains `needle`. A switching
/// user may or may not see their own departure notice before the join
/// notice, so tests sync on content rather than on notice count.
async fn recv_system_containing(
    ws: &mut ClientWs,
    needle: &str,
) -> ChatMessage {
    for _ in 0..10 {
        let msg = recv_kind(ws, MessageKind::System).await;
        if msg.content.as_deref().unwrap_or_default().contains(needle) {
            return msg;
        }
    }
    panic!("no system notice containing {needle:?} within 10 messages");
}

/// Connects and consumes the user's own join notice, so the session is
/// known to be fully set up.
async fn connect_and_settle(addr: &str, username: &str) -> ClientWs {
    let mut ws = connect(addr, username).await;
    let notice = recv_kind(&mut ws, MessageKind::System).await;
    assert!(
        notice
            .content
            .as_deref()
            .unwrap_or_default()
            .contains("joined the room"),
        "expected own join notice, got {notice:?}"
    );
    ws
}

fn chat(content: &str) -> ChatMessage {
    let mut msg = ChatMessage::new(MessageKind::Chat);
    msg.content = Some(content.to_string());
    msg
}

fn join_room(room: &str) -> ChatMessage {
    let mut msg = ChatMessage::new(MessageKind::JoinRoom);
    msg.room = Some(room.to_string());
    msg
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_connect_lands_in_default_room() {
    let addr = start_server().await;
    let mut ws = connect(&addr, "alice").await;

    let notice = recv(&mut ws).await;
    assert_eq!(notice.kind, MessageKind::System);
    assert_eq!(
        notice.content.as_deref(),
        Some("alice joined the room global")
    );
    assert_eq!(notice.room.as_deref(), Some("global"));
}

#[tokio::test]
async fn test_connect_without_username_is_rejected() {
    let addr = start_server().await;
    let url = format!("ws://{addr}/ws");
    let result = tokio_tungstenite::connect_async(url).await;
    assert!(result.is_err(), "upgrade should be refused");
}

#[tokio::test]
async fn test_duplicate_username_is_rejected() {
    let addr = start_server().await;
    let _alice = connect_and_settle(&addr, "alice").await;

    let mut imposter = connect(&addr, "alice").await;
    let rejection = recv(&mut imposter).await;
    assert_eq!(rejection.kind, MessageKind::UsernameExists);
    assert_eq!(
        rejection.content.as_deref(),
        Some("username already exists")
    );

    // The server closes the duplicate connection after the rejection.
    let next = tokio::time::timeout(Duration::from_secs(2), imposter.next())
        .await
        .expect("should see close");
    match next {
        Some(Ok(Message::Close(_))) | None => {}
        Some(Err(_)) => {}
        other => panic!("expected close, got {other:?}"),
    }
}

#[tokio::test]
async fn test_chat_reaches_roommates_but_not_sender() {
    let addr = start_server().await;
    let mut alice = connect_and_settle(&addr, "alice").await;
    let mut bob = connect_and_settle(&addr, "bob").await;
    // alice also hears bob arrive.
    recv_kind(&mut alice, MessageKind::System).await;

    alice.send(encode(&chat("hello bob"))).await.unwrap();

    let got = recv_kind(&mut bob, MessageKind::Chat).await;
    assert_eq!(got.sender.as_deref(), Some("alice"));
    assert_eq!(got.content.as_deref(), Some("hello bob"));
    // The server stamped the sender's room and a timestamp.
    assert_eq!(got.room.as_deref(), Some("global"));
    assert!(got.timestamp.is_some());

    // No echo back to alice.
    let echo = tokio::time::timeout(
        Duration::from_millis(200),
        alice.next(),
    )
    .await;
    assert!(echo.is_err(), "alice should not hear her own message");
}

#[tokio::test]
async fn test_server_overrides_claimed_sender() {
    let addr = start_server().await;
    let mut alice = connect_and_settle(&addr, "alice").await;
    let mut bob = connect_and_settle(&addr, "bob").await;
    recv_kind(&mut alice, MessageKind::System).await;

    // bob claims to be someone else; the server doesn't care.
    let mut forged = chat("trust me");
    forged.sender = Some("admin".to_string());
    bob.send(encode(&forged)).await.unwrap();

    let got = recv_kind(&mut alice, MessageKind::Chat).await;
    assert_eq!(got.sender.as_deref(), Some("bob"));
}

#[tokio::test]
async fn test_join_room_moves_session() {
    let addr = start_server().await;
    let mut alice = connect_and_settle(&addr, "alice").await;
    let mut bob = connect_and_settle(&addr, "bob").await;
    recv_kind(&mut alice, MessageKind::System).await;

    bob.send(encode(&join_room("team"))).await.unwrap();

    // alice sees bob leave global; bob sees himself arrive in team.
    let left = recv_kind(&mut alice, MessageKind::System).await;
    assert_eq!(left.content.as_deref(), Some("bob left the room"));
    recv_system_containing(&mut bob, "joined the room team").await;

    // Chat no longer crosses rooms.
    alice.send(encode(&chat("anyone here?"))).await.unwrap();
    let crossed = tokio::time::timeout(
        Duration::from_millis(200),
        bob.next(),
    )
    .await;
    assert!(crossed.is_err(), "bob left global, should hear nothing");
}

#[tokio::test]
async fn test_leave_room_returns_to_default() {
    let addr = start_server().await;
    let mut alice = connect_and_settle(&addr, "alice").await;

    alice.send(encode(&join_room("team"))).await.unwrap();
    recv_system_containing(&mut alice, "joined the room team").await;

    alice
        .send(encode(&ChatMessage::new(MessageKind::LeaveRoom)))
        .await
        .unwrap();
    recv_system_containing(&mut alice, "joined the room global").await;
}

#[tokio::test]
async fn test_list_users_all_and_per_room() {
    let addr = start_server().await;
    let mut alice = connect_and_settle(&addr, "alice").await;
    let mut bob = connect_and_settle(&addr, "bob").await;
    recv_kind(&mut alice, MessageKind::System).await;

    bob.send(encode(&join_room("team"))).await.unwrap();
    recv_system_containing(&mut bob, "joined the room team").await;

    // All connected users, regardless of room.
    alice
        .send(encode(&ChatMessage::new(MessageKind::ListUsers)))
        .await
        .unwrap();
    let reply =
        recv_kind(&mut alice, MessageKind::ListUsersResponse).await;
    assert_eq!(reply.content.as_deref(), Some("alice, bob"));

    // Scoped to one room.
    let mut scoped = ChatMessage::new(MessageKind::ListUsers);
    scoped.room = Some("team".to_string());
    alice.send(encode(&scoped)).await.unwrap();
    let reply =
        recv_kind(&mut alice, MessageKind::ListUsersResponse).await;
    assert_eq!(reply.content.as_deref(), Some("bob"));
}

#[tokio::test]
async fn test_list_rooms_shows_occupied_rooms() {
    let addr = start_server().await;
    let mut alice = connect_and_settle(&addr, "alice").await;
    let mut bob = connect_and_settle(&addr, "bob").await;
    recv_kind(&mut alice, MessageKind::System).await;

    bob.send(encode(&join_room("team"))).await.unwrap();
    recv_system_containing(&mut bob, "joined the room team").await;

    alice
        .send(encode(&ChatMessage::new(MessageKind::ListRooms)))
        .await
        .unwrap();
    let reply =
        recv_kind(&mut alice, MessageKind::ListRoomsResponse).await;
    assert_eq!(reply.content.as_deref(), Some("global, team"));
}

#[tokio::test]
async fn test_disconnect_cleans_up_presence() {
    let addr = start_server().await;
    let mut alice = connect_and_settle(&addr, "alice").await;
    let mut bob = connect_and_settle(&addr, "bob").await;
    recv_kind(&mut alice, MessageKind::System).await;

    bob.close(None).await.unwrap();

    // Teardown is asynchronous; poll until bob's name is released.
    let mut released = false;
    for _ in 0..50 {
        alice
            .send(encode(&ChatMessage::new(MessageKind::ListUsers)))
            .await
            .unwrap();
        let reply =
            recv_kind(&mut alice, MessageKind::ListUsersResponse).await;
        if reply.content.as_deref() == Some("alice") {
            released = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(released, "bob should be removed after disconnect");

    // The name is reusable immediately after cleanup.
    let _bob_again = connect_and_settle(&addr, "bob").await;
}

#[tokio::test]
async fn test_unknown_and_garbage_frames_are_ignored() {
    let addr = start_server().await;
    let mut alice = connect_and_settle(&addr, "alice").await;

    alice
        .send(Message::text(r#"{"type":"teleport"}"#))
        .await
        .unwrap();
    alice.send(Message::text("not json at all")).await.unwrap();

    // The session is still alive and answering.
    alice
        .send(encode(&ChatMessage::new(MessageKind::ListRooms)))
        .await
        .unwrap();
    let reply =
        recv_kind(&mut alice, MessageKind::ListRoomsResponse).await;
    assert_eq!(reply.content.as_deref(), Some("global"));
}

#[tokio::test]
async fn test_join_room_without_name_gets_notice() {
    let addr = start_server().await;
    let mut alice = connect_and_settle(&addr, "alice").await;

    alice
        .send(encode(&ChatMessage::new(MessageKind::JoinRoom)))
        .await
        .unwrap();

    let notice = recv_kind(&mut alice, MessageKind::System).await;
    assert_eq!(
        notice.content.as_deref(),
        Some("join_room requires a room name")
    );
}

#[tokio::test]
async fn test_store_error_in_list_does_not_leak_session() {
    let store = Arc::new(FlakyStore::default());
    store.deny_members("room:forbidden");
    let addr =
        start_server_with(Arc::new(MemoryBroker::new()), store).await;

    let mut alice = connect_and_settle(&addr, "alice").await;
    let mut bob = connect_and_settle(&addr, "bob").await;
    recv_kind(&mut alice, MessageKind::System).await;

    // The store refuses this lookup; alice gets a notice and the
    // session stays up.
    let mut scoped = ChatMessage::new(MessageKind::ListUsers);
    scoped.room = Some("forbidden".to_string());
    alice.send(encode(&scoped)).await.unwrap();
    let notice = recv_kind(&mut alice, MessageKind::System).await;
    assert_eq!(
        notice.content.as_deref(),
        Some("user list is unavailable")
    );

    // Disconnecting afterwards still runs teardown and frees the name.
    alice.close(None).await.unwrap();
    let mut released = false;
    for _ in 0..50 {
        bob.send(encode(&ChatMessage::new(MessageKind::ListUsers)))
            .await
            .unwrap();
        let reply =
            recv_kind(&mut bob, MessageKind::ListUsersResponse).await;
        if reply.content.as_deref() == Some("bob") {
            released = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(released, "alice should be removed after disconnect");
}

#[tokio::test]
async fn test_failed_default_join_frees_the_name_and_room_slot() {
    let broker = Arc::new(GatedBroker::default());
    broker.deny_publish("chat.room.global");
    let addr = start_server_with(
        Arc::clone(&broker),
        Arc::new(MemoryStore::new()),
    )
    .await;

    // The join notice can't be published, so the default-room join
    // fails and the server closes the session.
    let mut ws = connect(&addr, "alice").await;
    let next = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("should see close");
    match next {
        Some(Ok(Message::Close(_))) | None => {}
        Some(Err(_)) => {}
        other => panic!("expected close, got {other:?}"),
    }

    broker.allow_publish("chat.room.global");

    // The failed join left nothing behind: the same name connects
    // cleanly and receives room traffic.
    let mut alice = connect_and_settle(&addr, "alice").await;
    let mut bob = connect_and_settle(&addr, "bob").await;
    recv_kind(&mut alice, MessageKind::System).await;

    bob.send(encode(&chat("hello again"))).await.unwrap();
    let got = recv_kind(&mut alice, MessageKind::Chat).await;
    assert_eq!(got.content.as_deref(), Some("hello again"));
}

#[tokio::test]
async fn test_join_current_room_is_noop() {
    let addr = start_server().await;
    let mut alice = connect_and_settle(&addr, "alice").await;

    alice.send(encode(&join_room("global"))).await.unwrap();

    // No churn: no leave/join notices, and the next command answers.
    alice
        .send(encode(&ChatMessage::new(MessageKind::ListRooms)))
        .await
        .unwrap();
    let reply = recv(&mut alice).await;
    assert_eq!(reply.kind, MessageKind::ListRoomsResponse);
}
