//! WebSocket Messaging Hub Library
//!
//! A real-time group and private messaging hub built with tokio-tungstenite
//! using the Actor pattern for state management.
//!
//! # Features
//! - WebSocket connection handling
//! - Identity binding (verified upstream, trusted here)
//! - Named rooms with implicit creation and a default "general" room
//! - Room fan-out with sender confirmation
//! - Private 1:1 messages
//! - Typing indicators with silent expiry
//! - Read receipts and emoji reactions
//! - Capped in-memory history with pagination
//! - HTTP query surface and attachment uploads
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning all state
//! - Each connection has a `handler` task communicating with the server
//! - The HTTP API asks the server through a `HubHandle`
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use chat_hub::{handle_connection, HubConfig, HubHandle};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let hub = HubHandle::spawn(HubConfig::default(), 256);
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, hub.sender()));
//!     }
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod presence;
pub mod room;
pub mod server;
pub mod store;
pub mod types;
pub mod upload;

// Re-export main types for convenience
pub use client::{Client, ClientRegistry, UserInfo};
pub use config::{Config, HubConfig};
pub use error::{AppError, SendError, UploadError};
pub use handler::handle_connection;
pub use message::{ClientMessage, ServerMessage};
pub use presence::TypingTracker;
pub use room::{Room, RoomDirectory};
pub use server::{ChatServer, HubHandle, ServerCommand, Target};
pub use store::{Attachment, ChatMessage, MessageStore, NewMessage, Page};
pub use types::{ConnectionId, MessageId, GENERAL_ROOM};
pub use upload::{BlobStore, DiskBlobStore};
