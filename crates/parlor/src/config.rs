//! Server configuration.

use serde::Deserialize;

use crate::ParlorError;

/// Configuration for a Parlor server instance.
///
/// Every field has a default, so a config file only needs to name what
/// it changes:
///
/// ```json
/// { "bind_addr": "0.0.0.0:9000", "default_room": "lobby" }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,

    /// Room every connection starts in, and the room `leave_room`
    /// returns users to.
    pub default_room: String,

    /// Capacity of each session's outbound queue. When a client can't
    /// keep up, messages past this many are dropped.
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            default_room: "global".to_string(),
            outbound_queue: 64,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a JSON file.
    pub fn from_file(path: &str) -> Result<Self, ParlorError> {
        let contents = std::fs::read_to_string(path).map_err(|source| {
            ParlorError::ConfigIo {
                path: path.to_string(),
                source,
            }
        })?;
        serde_json::from_str(&contents).map_err(|source| {
            ParlorError::ConfigParse {
                path: path.to_string(),
                source,
            }
        })
    }
}
