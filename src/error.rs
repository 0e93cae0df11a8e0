//! Error types for the messaging hub
//!
//! Defines application-level errors, outbound send errors and upload
//! boundary errors. Uses thiserror for ergonomic error definitions.
//!
//! Bad client commands are not errors: the hub ignores them. These types only
//! cover transport failures and the upload collaborator.

use thiserror::Error;

/// Application-level errors
///
/// All of these end the affected connection (or the request at the HTTP
/// boundary); none of them stop the hub.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The hub's command channel is closed
    #[error("Channel send error")]
    ChannelSend,

    /// The hub dropped a query without answering
    #[error("Hub did not reply")]
    NoReply,
}

/// Message send errors
///
/// Occurs when delivering a notification to a connection's outbound queue.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The connection is not draining its queue fast enough
    #[error("Channel full")]
    ChannelFull,
}

/// Upload boundary errors
///
/// Reported back to the uploader with a human-readable reason.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No files")]
    NoFiles,

    #[error("Too many files (max {max})")]
    TooManyFiles { max: usize },

    #[error("File '{name}' exceeds {max} bytes")]
    TooLarge { name: String, max: usize },

    #[error("Malformed upload: {0}")]
    Malformed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}
