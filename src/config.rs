//! Runtime configuration
//!
//! Command-line flags with environment variable fallbacks.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::store::DEFAULT_CAPACITY;

/// WebSocket messaging hub
#[derive(Parser, Debug, Clone)]
#[command(name = "chat_hub", version, about = "WebSocket messaging hub")]
pub struct Config {
    /// WebSocket listen address
    #[arg(long, env = "CHAT_WS_ADDR", default_value = "127.0.0.1:8080")]
    pub ws_addr: SocketAddr,

    /// HTTP query/upload API listen address
    #[arg(long, env = "CHAT_HTTP_ADDR", default_value = "127.0.0.1:5000")]
    pub http_addr: SocketAddr,

    /// Directory uploaded attachments are written to
    #[arg(long, env = "CHAT_UPLOAD_DIR", default_value = "./uploads")]
    pub upload_dir: PathBuf,

    /// Messages sent as catch-up history when joining a room
    #[arg(long, env = "CHAT_HISTORY_LIMIT", default_value_t = 50)]
    pub history_limit: usize,

    /// Messages retained process-wide before the oldest is evicted
    #[arg(long, env = "CHAT_MESSAGE_CAPACITY", default_value_t = DEFAULT_CAPACITY)]
    pub message_capacity: usize,

    /// Seconds of silence before a typing indicator is dropped (0 disables)
    #[arg(long, env = "CHAT_TYPING_TIMEOUT_SECS", default_value_t = 5)]
    pub typing_timeout_secs: u64,

    /// Buffer size of the hub command channel
    #[arg(long, env = "CHAT_CHANNEL_BUFFER", default_value_t = 256)]
    pub channel_buffer: usize,
}

impl Config {
    pub fn hub(&self) -> HubConfig {
        HubConfig {
            history_limit: self.history_limit,
            message_capacity: self.message_capacity,
            typing_timeout: (self.typing_timeout_secs > 0)
                .then(|| Duration::from_secs(self.typing_timeout_secs)),
        }
    }
}

/// Settings the hub actor itself needs
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub history_limit: usize,
    pub message_capacity: usize,
    /// None disables typing expiry
    pub typing_timeout: Option<Duration>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            history_limit: 50,
            message_capacity: DEFAULT_CAPACITY,
            typing_timeout: Some(Duration::from_secs(5)),
        }
    }
}
