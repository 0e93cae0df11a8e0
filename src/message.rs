//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization. The `type` tag carries the
//! event name; payload fields are camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::UserInfo;
use crate::store::{Attachment, ChatMessage};
use crate::types::{ConnectionId, MessageId};

/// Client → Server message
///
/// All messages from client to server. Uses tagged enum with snake_case naming.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind a display identity (required before anything else)
    Identify { username: String },
    /// Create an empty room
    #[serde(rename_all = "camelCase")]
    CreateRoom { room_name: String },
    /// Join a room, creating it if needed
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_name: String },
    /// Leave a room
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_name: String },
    /// Post to a room
    #[serde(rename_all = "camelCase")]
    SendMessage {
        #[serde(default)]
        room: Option<String>,
        #[serde(default)]
        text: String,
        #[serde(default)]
        attachments: Vec<Attachment>,
        /// Client-local correlation token echoed in the confirmation
        #[serde(default)]
        client_id: Option<String>,
    },
    /// Typing indicator, room-scoped or direct
    #[serde(rename_all = "camelCase")]
    Typing {
        #[serde(default)]
        room: Option<String>,
        #[serde(default)]
        is_typing: bool,
        #[serde(default)]
        to_connection_id: Option<ConnectionId>,
    },
    /// 1:1 message to another connection
    #[serde(rename_all = "camelCase")]
    PrivateMessage {
        to_connection_id: ConnectionId,
        #[serde(default)]
        text: String,
        #[serde(default)]
        attachments: Vec<Attachment>,
    },
    /// Read receipt
    #[serde(rename_all = "camelCase")]
    MessageRead {
        message_id: String,
        #[serde(default)]
        room: Option<String>,
    },
    /// Toggle an emoji reaction
    #[serde(rename_all = "camelCase")]
    MessageReaction { message_id: String, emoji: String },
}

/// Server → Client message
///
/// All messages from server to client. Uses tagged enum with snake_case naming.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection accepted, connection ID issued
    #[serde(rename_all = "camelCase")]
    Connected { connection_id: ConnectionId },
    /// Someone identified
    UserJoined {
        username: String,
        id: ConnectionId,
        timestamp: DateTime<Utc>,
    },
    /// Someone disconnected
    UserLeft {
        username: String,
        id: ConnectionId,
        timestamp: DateTime<Utc>,
    },
    /// Every identified connection
    UserList { users: Vec<UserInfo> },
    /// Every known room
    RoomsList { rooms: Vec<String> },
    /// A connection joined a room
    RoomJoined {
        room: String,
        username: String,
        id: ConnectionId,
    },
    /// A connection left a room
    RoomLeft {
        room: String,
        username: String,
        id: ConnectionId,
    },
    /// Identities currently in a room
    RoomUserList { room: String, users: Vec<UserInfo> },
    /// Catch-up history sent on join
    MessageHistory {
        room: String,
        history: Vec<ChatMessage>,
    },
    /// New room message
    ReceiveMessage(ChatMessage),
    /// Sender-only acknowledgement of a stored room message
    #[serde(rename_all = "camelCase")]
    MessageConfirm {
        id: MessageId,
        client_id: Option<String>,
        room: String,
        timestamp: DateTime<Utc>,
    },
    /// New 1:1 message
    PrivateMessage(ChatMessage),
    /// Who is typing in a room
    TypingUsers { room: String, users: Vec<String> },
    /// Direct typing indicator
    #[serde(rename_all = "camelCase")]
    TypingPrivate {
        from: String,
        from_id: ConnectionId,
        is_typing: bool,
    },
    /// Read receipt
    #[serde(rename_all = "camelCase")]
    MessageRead { message_id: MessageId, by: String },
    /// Reaction set changed
    #[serde(rename_all = "camelCase")]
    MessageReaction {
        message_id: MessageId,
        emoji: String,
        users: Vec<String>,
    },
}

impl ServerMessage {
    /// Event name as it appears in the `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::UserJoined { .. } => "user_joined",
            Self::UserLeft { .. } => "user_left",
            Self::UserList { .. } => "user_list",
            Self::RoomsList { .. } => "rooms_list",
            Self::RoomJoined { .. } => "room_joined",
            Self::RoomLeft { .. } => "room_left",
            Self::RoomUserList { .. } => "room_user_list",
            Self::MessageHistory { .. } => "message_history",
            Self::ReceiveMessage(_) => "receive_message",
            Self::MessageConfirm { .. } => "message_confirm",
            Self::PrivateMessage(_) => "private_message",
            Self::TypingUsers { .. } => "typing_users",
            Self::TypingPrivate { .. } => "typing_private",
            Self::MessageRead { .. } => "message_read",
            Self::MessageReaction { .. } => "message_reaction",
        }
    }
}
