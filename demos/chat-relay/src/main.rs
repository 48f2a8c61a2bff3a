//! A self-contained chat relay: Parlor with the in-memory broker and
//! presence store.
//!
//! ```text
//! chat-relay [config.json]
//! ```
//!
//! Connect with any WebSocket client:
//!
//! ```text
//! websocat "ws://127.0.0.1:8080/ws?username=alice"
//! {"type":"chat_message","content":"hello"}
//! {"type":"join_room","room":"team"}
//! {"type":"list_users"}
//! ```
//!
//! Log verbosity is controlled with `RUST_LOG` (e.g. `RUST_LOG=debug`).

use std::sync::Arc;

use parlor::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::from_file(&path)?,
        None => ServerConfig::default(),
    };
    tracing::info!(
        bind = %config.bind_addr,
        default_room = %config.default_room,
        "starting chat relay"
    );

    let server = ParlorServerBuilder::new()
        .config(config)
        .build(
            Arc::new(MemoryBroker::new()),
            Arc::new(MemoryStore::new()),
        )
        .await?;

    server
        .serve_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("chat relay stopped");
    Ok(())
}
