//! Core protocol types for Parlor's wire format.
//!
//! Every frame exchanged with a client — and every payload published to
//! a room topic — is a single [`ChatMessage`] envelope serialized as a
//! JSON object. The `type` field selects the operation; all other fields
//! are optional and omitted when absent.

use serde::{Deserialize, Serialize};

use std::fmt;

/// Timestamp format used on the wire: `2024-01-02 15:04:05`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// The kind of an envelope — what the sender wants to happen.
///
/// The wire tags (`chat_message`, `join_room`, ...) are fixed by the
/// client protocol. Serde's derive can't map "any other string" onto a
/// fallback variant for a plain string enum, so `Serialize` and
/// `Deserialize` are written by hand around [`as_tag`](Self::as_tag) /
/// [`from_tag`](Self::from_tag).
///
/// The [`Unknown`](Self::Unknown) variant absorbs any unrecognized tag.
/// An envelope with a kind we don't understand still deserializes, so
/// sessions can log and ignore it instead of treating it as a malformed
/// frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// A user-authored chat line, broadcast to the sender's room.
    Chat,

    /// A server-generated notification (joins, leaves, errors).
    System,

    /// Client → Server: "move me into the room named in `room`."
    JoinRoom,

    /// Client → Server: "take me back to the default room."
    LeaveRoom,

    /// Client → Server: list active users (all, or one room's members
    /// when `room` is set).
    ListUsers,

    /// Client → Server: list rooms that currently have members.
    ListRooms,

    /// Server → Client: reply to [`ListUsers`](Self::ListUsers).
    ListUsersResponse,

    /// Server → Client: reply to [`ListRooms`](Self::ListRooms).
    ListRoomsResponse,

    /// Server → Client: the requested display name is already connected.
    /// Sent once, then the connection is closed.
    UsernameExists,

    /// Any tag this server doesn't recognize. Logged and ignored.
    Unknown,
}

impl MessageKind {
    /// The wire tag for this kind.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Chat => "chat_message",
            Self::System => "system_message",
            Self::JoinRoom => "join_room",
            Self::LeaveRoom => "leave_room",
            Self::ListUsers => "list_users",
            Self::ListRooms => "list_rooms",
            Self::ListUsersResponse => "list_users_response",
            Self::ListRoomsResponse => "list_rooms_response",
            Self::UsernameExists => "username_exists",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a wire tag. Unrecognized tags map to
    /// [`Unknown`](Self::Unknown), never to an error.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "chat_message" => Self::Chat,
            "system_message" => Self::System,
            "join_room" => Self::JoinRoom,
            "leave_room" => Self::LeaveRoom,
            "list_users" => Self::ListUsers,
            "list_rooms" => Self::ListRooms,
            "list_users_response" => Self::ListUsersResponse,
            "list_rooms_response" => Self::ListRoomsResponse,
            "username_exists" => Self::UsernameExists,
            _ => Self::Unknown,
        }
    }
}

impl Serialize for MessageKind {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_tag())
    }
}

impl<'de> Deserialize<'de> for MessageKind {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let tag = std::borrow::Cow::<str>::deserialize(deserializer)?;
        Ok(Self::from_tag(&tag))
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_tag())
    }
}

// ---------------------------------------------------------------------------
// ChatMessage
// ---------------------------------------------------------------------------

/// The single envelope type for all traffic.
///
/// ```text
/// { "type": "chat_message",
///   "sender": "alice",
///   "content": "hi",
///   "room": "team",
///   "timestamp": "2024-01-02 15:04:05" }
/// ```
///
/// Only `type` is required. Absent fields are skipped during
/// serialization and default to `None` when missing on input, so
/// clients can send the minimal shape for each operation.
///
/// Invariant: a [`Chat`](MessageKind::Chat) envelope always has `room`
/// populated before it reaches the router — the session stamps it with
/// the sender's current room when the client leaves it empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// What this envelope means. Serialized as `"type"`.
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Display name of the author. Server-stamped on chat messages;
    /// `None` on system notifications so they pass every subscriber's
    /// echo filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    /// Human-readable body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// The room this envelope targets or describes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,

    /// Wall-clock timestamp string, server-assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ChatMessage {
    /// Creates a bare envelope of the given kind with no other fields.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            sender: None,
            content: None,
            room: None,
            timestamp: None,
        }
    }

    /// Creates a system notification for a room (no sender, so it is
    /// delivered to every subscriber including the user it describes).
    pub fn system(content: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::System,
            sender: None,
            content: Some(content.into()),
            room: Some(room.into()),
            timestamp: Some(Self::now()),
        }
    }

    /// Creates a server reply envelope (`list_users_response` /
    /// `list_rooms_response`) with the given body.
    pub fn response(kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            sender: None,
            content: Some(content.into()),
            room: None,
            timestamp: Some(Self::now()),
        }
    }

    /// Creates the rejection envelope sent when a display name is
    /// already active.
    pub fn username_exists() -> Self {
        Self {
            kind: MessageKind::UsernameExists,
            sender: None,
            content: Some("username already exists".to_string()),
            room: None,
            timestamp: Some(Self::now()),
        }
    }

    /// The current wall-clock time in the wire's timestamp format.
    pub fn now() -> String {
        chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The wire format is fixed by the client protocol. These tests pin
    //! the exact JSON shapes — a mismatch means existing clients can't
    //! parse our frames.

    use super::*;

    // =====================================================================
    // MessageKind tags
    // =====================================================================

    #[test]
    fn test_kind_serializes_with_wire_tags() {
        let json = serde_json::to_string(&MessageKind::Chat).unwrap();
        assert_eq!(json, "\"chat_message\"");

        let json = serde_json::to_string(&MessageKind::JoinRoom).unwrap();
        assert_eq!(json, "\"join_room\"");

        let json =
            serde_json::to_string(&MessageKind::UsernameExists).unwrap();
        assert_eq!(json, "\"username_exists\"");
    }

    #[test]
    fn test_kind_unrecognized_tag_becomes_unknown() {
        // An unexpected tag must not be a decode error, because
        // sessions ignore unknown kinds instead of killing the
        // connection.
        let kind: MessageKind =
            serde_json::from_str("\"fly_to_moon\"").unwrap();
        assert_eq!(kind, MessageKind::Unknown);
    }

    #[test]
    fn test_kind_display_matches_wire_tag() {
        assert_eq!(MessageKind::Chat.to_string(), "chat_message");
        assert_eq!(MessageKind::ListRooms.to_string(), "list_rooms");
    }

    // =====================================================================
    // ChatMessage shapes
    // =====================================================================

    #[test]
    fn test_envelope_minimal_input_shape() {
        // Clients may send just a type — everything else defaults.
        let msg: ChatMessage =
            serde_json::from_str(r#"{"type":"list_rooms"}"#).unwrap();
        assert_eq!(msg.kind, MessageKind::ListRooms);
        assert!(msg.sender.is_none());
        assert!(msg.content.is_none());
        assert!(msg.room.is_none());
        assert!(msg.timestamp.is_none());
    }

    #[test]
    fn test_envelope_absent_fields_are_omitted() {
        let msg = ChatMessage::new(MessageKind::ListUsers);
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "list_users");
        // skip_serializing_if — no nulls on the wire.
        assert!(json.get("sender").is_none());
        assert!(json.get("room").is_none());
    }

    #[test]
    fn test_envelope_full_chat_round_trip() {
        let msg = ChatMessage {
            kind: MessageKind::Chat,
            sender: Some("alice".into()),
            content: Some("hi".into()),
            room: Some("team".into()),
            timestamp: Some("2024-01-02 15:04:05".into()),
        };
        let bytes = serde_json::to_vec(&msg).unwrap();
        let decoded: ChatMessage = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_envelope_unknown_kind_still_decodes() {
        let msg: ChatMessage = serde_json::from_str(
            r#"{"type":"teleport","content":"??"}"#,
        )
        .unwrap();
        assert_eq!(msg.kind, MessageKind::Unknown);
        assert_eq!(msg.content.as_deref(), Some("??"));
    }

    #[test]
    fn test_system_constructor_has_no_sender() {
        // System notices carry no sender so every subscriber's echo
        // filter passes them through.
        let msg = ChatMessage::system("alice joined the room team", "team");
        assert_eq!(msg.kind, MessageKind::System);
        assert!(msg.sender.is_none());
        assert_eq!(msg.room.as_deref(), Some("team"));
        assert!(msg.timestamp.is_some());
    }

    #[test]
    fn test_username_exists_constructor() {
        let msg = ChatMessage::username_exists();
        assert_eq!(msg.kind, MessageKind::UsernameExists);
        assert_eq!(msg.content.as_deref(), Some("username already exists"));
    }

    #[test]
    fn test_now_matches_wire_format() {
        // "YYYY-MM-DD HH:MM:SS" — 19 characters, space-separated.
        let ts = ChatMessage::now();
        assert_eq!(ts.len(), 19);
        assert_eq!(ts.as_bytes()[10], b' ');
    }

    #[test]
    fn test_decode_missing_type_returns_error() {
        let result: Result<ChatMessage, _> =
            serde_json::from_str(r#"{"content":"hello"}"#);
        assert!(result.is_err());
    }
}
