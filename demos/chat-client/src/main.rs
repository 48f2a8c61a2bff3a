//! Interactive command-line chat client for a Parlor relay.
//!
//! ```text
//! chat-client <username> [server-addr]
//! ```
//!
//! Lines starting with `/` are commands, everything else is sent as
//! chat to the current room:
//!
//! ```text
//! /join <room>    switch to another room
//! /leave          return to the default room
//! /users [room]   list connected users, optionally per room
//! /rooms          list occupied rooms
//! /quit           disconnect
//! ```

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::tungstenite::Message;

use parlor_protocol::{ChatMessage, MessageKind};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let Some(username) = args.next() else {
        eprintln!("usage: chat-client <username> [server-addr]");
        std::process::exit(2);
    };
    let addr =
        args.next().unwrap_or_else(|| "127.0.0.1:8080".to_string());

    let url = format!(
        "ws://{addr}/ws?username={}",
        urlencoding::encode(&username)
    );
    let (ws, _) = tokio_tungstenite::connect_async(url).await?;
    let (mut sink, mut stream) = ws.split();
    println!("connected to {addr} as {username}");

    // Incoming frames print as they arrive, independent of the prompt.
    let printer = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(_) => break,
            };
            let Message::Text(text) = frame else { continue };
            match serde_json::from_str::<ChatMessage>(&text) {
                Ok(msg) => print_envelope(&msg),
                Err(_) => println!("?? {text}"),
            }
        }
        println!("disconnected");
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        let Some(msg) = envelope_for(line) else {
            println!(
                "commands: /join <room>, /leave, /users [room], \
                 /rooms, /quit"
            );
            continue;
        };
        let text = serde_json::to_string(&msg)?;
        if sink.send(Message::text(text)).await.is_err() {
            break;
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    printer.abort();
    Ok(())
}

/// Turns an input line into the envelope to send, or `None` for an
/// unrecognized command.
fn envelope_for(line: &str) -> Option<ChatMessage> {
    if let Some(room) = line.strip_prefix("/join ") {
        let room = room.trim();
        if room.is_empty() {
            return None;
        }
        let mut msg = ChatMessage::new(MessageKind::JoinRoom);
        msg.room = Some(room.to_string());
        return Some(msg);
    }
    if line == "/leave" {
        return Some(ChatMessage::new(MessageKind::LeaveRoom));
    }
    if let Some(rest) = line.strip_prefix("/users") {
        if rest.is_empty() || rest.starts_with(' ') {
            let mut msg = ChatMessage::new(MessageKind::ListUsers);
            let room = rest.trim();
            if !room.is_empty() {
                msg.room = Some(room.to_string());
            }
            return Some(msg);
        }
        return None;
    }
    if line == "/rooms" {
        return Some(ChatMessage::new(MessageKind::ListRooms));
    }
    if line.starts_with('/') {
        return None;
    }

    let mut msg = ChatMessage::new(MessageKind::Chat);
    msg.content = Some(line.to_string());
    Some(msg)
}

fn print_envelope(msg: &ChatMessage) {
    let content = msg.content.as_deref().unwrap_or_default();
    match msg.kind {
        MessageKind::Chat => {
            let sender = msg.sender.as_deref().unwrap_or("?");
            match &msg.timestamp {
                Some(ts) => println!("[{ts}] {sender}: {content}"),
                None => println!("{sender}: {content}"),
            }
        }
        MessageKind::System => println!("* {content}"),
        MessageKind::ListUsersResponse => println!("users: {content}"),
        MessageKind::ListRoomsResponse => println!("rooms: {content}"),
        MessageKind::UsernameExists => {
            println!("!! that username is already taken");
        }
        _ => {}
    }
}
