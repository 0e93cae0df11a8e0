//! ChatServer Actor implementation
//!
//! The central actor that owns all hub state: the connection registry, the
//! room directory, typing presence and the message store. Handlers and the
//! HTTP API talk to it exclusively through `ServerCommand`s, so commands are
//! applied strictly one at a time.

use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::client::{ClientRegistry, UserInfo};
use crate::config::HubConfig;
use crate::error::{AppError, SendError};
use crate::message::{ClientMessage, ServerMessage};
use crate::presence::TypingTracker;
use crate::room::RoomDirectory;
use crate::store::{Attachment, MessageStore, NewMessage, Page};
use crate::types::{ConnectionId, GENERAL_ROOM};

/// Commands sent to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// New transport connection
    Connect {
        connection_id: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
    },
    /// Transport connection closed
    Disconnect { connection_id: ConnectionId },
    /// Parsed client frame
    Client {
        connection_id: ConnectionId,
        message: ClientMessage,
    },
    /// Read-only query
    Query(Query),
}

/// Read-only queries answered over a oneshot channel
#[derive(Debug)]
pub enum Query {
    Rooms {
        reply: oneshot::Sender<Vec<String>>,
    },
    Users {
        reply: oneshot::Sender<Vec<UserInfo>>,
    },
    Messages {
        room: String,
        page: usize,
        page_size: usize,
        reply: oneshot::Sender<Page>,
    },
}

/// Who a notification goes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A single connection
    Connection(ConnectionId),
    /// Every member of a room
    Room(String),
    /// Every member of a room but one
    RoomExcept(String, ConnectionId),
    /// Every live connection
    All,
}

/// The main ChatServer actor
pub struct ChatServer {
    clients: ClientRegistry,
    rooms: RoomDirectory,
    typing: TypingTracker,
    messages: MessageStore,
    config: HubConfig,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>, config: HubConfig) -> Self {
        Self {
            clients: ClientRegistry::new(),
            rooms: RoomDirectory::new(),
            typing: TypingTracker::new(),
            messages: MessageStore::new(config.message_capacity),
            config,
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are
    /// dropped. Stale typing indicators are swept between commands.
    pub async fn run(mut self) {
        info!("ChatServer started");

        let sweep_every = self
            .config
            .typing_timeout
            .map(|t| (t / 2).max(Duration::from_millis(100)))
            .unwrap_or(Duration::from_secs(3600));
        let mut sweep = tokio::time::interval(sweep_every);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                _ = sweep.tick(), if self.config.typing_timeout.is_some() => {
                    self.expire_typing(Instant::now());
                }
            }
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect {
                connection_id,
                sender,
            } => self.handle_connect(connection_id, sender),
            ServerCommand::Disconnect { connection_id } => self.handle_disconnect(connection_id),
            ServerCommand::Client {
                connection_id,
                message,
            } => self.handle_client_message(connection_id, message),
            ServerCommand::Query(query) => self.handle_query(query),
        }
    }

    fn handle_client_message(&mut self, id: ConnectionId, message: ClientMessage) {
        if let ClientMessage::Identify { username } = message {
            self.handle_identify(id, username);
            return;
        }

        let Some(username) = self.clients.lookup(id).map(str::to_string) else {
            debug!("Ignoring {:?} from unidentified connection {}", message, id);
            return;
        };

        match message {
            ClientMessage::Identify { .. } => {}
            ClientMessage::CreateRoom { room_name } => self.handle_create_room(room_name),
            ClientMessage::JoinRoom { room_name } => self.handle_join_room(id, &username, room_name),
            ClientMessage::LeaveRoom { room_name } => {
                self.handle_leave_room(id, &username, room_name)
            }
            ClientMessage::SendMessage {
                room,
                text,
                attachments,
                client_id,
            } => self.handle_send_message(id, &username, room, text, attachments, client_id),
            ClientMessage::Typing {
                room,
                is_typing,
                to_connection_id,
            } => self.handle_typing(id, &username, room, is_typing, to_connection_id),
            ClientMessage::PrivateMessage {
                to_connection_id,
                text,
                attachments,
            } => self.handle_private_message(id, &username, to_connection_id, text, attachments),
            ClientMessage::MessageRead { message_id, room } => {
                self.handle_message_read(&username, &message_id, room)
            }
            ClientMessage::MessageReaction { message_id, emoji } => {
                self.handle_message_reaction(&username, &message_id, &emoji)
            }
        }
    }

    /// Handle new transport connection
    fn handle_connect(&mut self, id: ConnectionId, sender: mpsc::Sender<ServerMessage>) {
        info!("Connection {} opened", id);
        self.clients.register(id, sender);

        let target = Target::Connection(id);
        self.deliver(&target, ServerMessage::Connected { connection_id: id });
        self.deliver(&target, self.rooms_list());
        self.deliver(&target, self.user_list());
        self.deliver(
            &target,
            ServerMessage::MessageHistory {
                room: GENERAL_ROOM.to_string(),
                history: self.messages.history(GENERAL_ROOM, self.config.history_limit),
            },
        );

        debug!(
            "Total connections: {}, Total rooms: {}",
            self.clients.len(),
            self.rooms.len()
        );
    }

    /// Handle transport disconnection
    fn handle_disconnect(&mut self, id: ConnectionId) {
        let Some(client) = self.clients.unregister(id) else {
            return;
        };
        info!("Connection {} closed", id);

        self.rooms.remove_everywhere(id);
        let typing = self.typing.clear_typing(id);

        if let Some(username) = client.username {
            self.deliver(
                &Target::All,
                ServerMessage::UserLeft {
                    username,
                    id,
                    timestamp: Utc::now(),
                },
            );
        }
        self.deliver(&Target::All, self.user_list());
        self.deliver(&Target::All, self.rooms_list());
        if let Some(record) = typing {
            let users = self.typing.typing_in(&record.room, None);
            self.deliver(
                &Target::All,
                ServerMessage::TypingUsers {
                    room: record.room,
                    users,
                },
            );
        }

        debug!(
            "Total connections: {}, Total rooms: {}",
            self.clients.len(),
            self.rooms.len()
        );
    }

    /// Handle identification
    fn handle_identify(&mut self, id: ConnectionId, username: String) {
        let username = username.trim().to_string();
        if username.is_empty() {
            debug!("Ignoring empty identity from {}", id);
            return;
        }
        if !self.clients.identify(id, username.clone()) {
            return;
        }

        self.rooms.join(GENERAL_ROOM, id);
        if let Some(client) = self.clients.get_mut(id) {
            client.rooms.insert(GENERAL_ROOM.to_string());
        }
        info!("Connection {} identified as '{}'", id, username);

        self.deliver(
            &Target::All,
            ServerMessage::UserJoined {
                username,
                id,
                timestamp: Utc::now(),
            },
        );
        self.deliver(&Target::All, self.user_list());
        self.deliver(&Target::All, self.rooms_list());
        self.deliver(
            &Target::Room(GENERAL_ROOM.to_string()),
            ServerMessage::RoomUserList {
                room: GENERAL_ROOM.to_string(),
                users: self.room_users(GENERAL_ROOM),
            },
        );
    }

    /// Handle explicit room creation
    fn handle_create_room(&mut self, room_name: String) {
        let name = room_name.trim();
        if name.is_empty() || !self.rooms.ensure_room(name) {
            return;
        }
        info!("Room '{}' created", name);
        self.deliver(&Target::All, self.rooms_list());
    }

    /// Handle room joining
    fn handle_join_room(&mut self, id: ConnectionId, username: &str, room_name: String) {
        let name = room_name.trim().to_string();
        if name.is_empty() {
            return;
        }

        self.rooms.join(&name, id);
        if let Some(client) = self.clients.get_mut(id) {
            client.rooms.insert(name.clone());
        }
        info!("'{}' joined room '{}'", username, name);

        self.deliver(
            &Target::Room(name.clone()),
            ServerMessage::RoomJoined {
                room: name.clone(),
                username: username.to_string(),
                id,
            },
        );
        self.deliver(&Target::All, self.rooms_list());
        let history = self.messages.history(&name, self.config.history_limit);
        self.deliver(
            &Target::Connection(id),
            ServerMessage::MessageHistory {
                room: name,
                history,
            },
        );
    }

    /// Handle voluntary room leaving
    fn handle_leave_room(&mut self, id: ConnectionId, username: &str, room_name: String) {
        let name = room_name.trim().to_string();
        if !self.rooms.leave(&name, id) {
            return;
        }
        if let Some(client) = self.clients.get_mut(id) {
            client.rooms.remove(&name);
        }
        info!("'{}' left room '{}'", username, name);

        self.deliver(
            &Target::Room(name.clone()),
            ServerMessage::RoomLeft {
                room: name,
                username: username.to_string(),
                id,
            },
        );
        self.deliver(&Target::All, self.rooms_list());
    }

    /// Handle room message
    fn handle_send_message(
        &mut self,
        id: ConnectionId,
        username: &str,
        room: Option<String>,
        text: String,
        attachments: Vec<Attachment>,
        client_id: Option<String>,
    ) {
        let room = room_or_general(room);
        let message = self.messages.append(
            NewMessage::room(&room, username, id, text).with_attachments(attachments),
        );
        debug!("'{}' posted {} to '{}'", username, message.id, room);

        // Sending ends the sender's typing indicator
        if let Some(record) = self.typing.clear_typing(id) {
            self.broadcast_typing(&record.room, None);
        }

        let confirm = ServerMessage::MessageConfirm {
            id: message.id.clone(),
            client_id,
            room: room.clone(),
            timestamp: message.timestamp,
        };
        self.deliver(
            &Target::RoomExcept(room, id),
            ServerMessage::ReceiveMessage(message),
        );
        self.deliver(&Target::Connection(id), confirm);
    }

    /// Handle typing indicator
    fn handle_typing(
        &mut self,
        id: ConnectionId,
        username: &str,
        room: Option<String>,
        is_typing: bool,
        to: Option<ConnectionId>,
    ) {
        if let Some(target) = to {
            self.deliver(
                &Target::Connection(target),
                ServerMessage::TypingPrivate {
                    from: username.to_string(),
                    from_id: id,
                    is_typing,
                },
            );
            return;
        }

        let room = room_or_general(room);
        if is_typing {
            if let Some(previous) = self.typing.set_typing(id, username, &room) {
                self.broadcast_typing(&previous, None);
            }
        } else if let Some(record) = self.typing.clear_typing(id) {
            if record.room != room {
                self.broadcast_typing(&record.room, None);
            }
        }
        self.broadcast_typing(&room, Some(id));
    }

    /// Handle 1:1 message
    fn handle_private_message(
        &mut self,
        id: ConnectionId,
        username: &str,
        to: ConnectionId,
        text: String,
        attachments: Vec<Attachment>,
    ) {
        let message = self
            .messages
            .append(NewMessage::private(to, username, id, text).with_attachments(attachments));
        debug!("'{}' sent private {} to {}", username, message.id, to);

        if to != id {
            self.deliver(
                &Target::Connection(to),
                ServerMessage::PrivateMessage(message.clone()),
            );
        }
        self.deliver(&Target::Connection(id), ServerMessage::PrivateMessage(message));
    }

    /// Handle read receipt
    fn handle_message_read(&mut self, reader: &str, message_id: &str, room_hint: Option<String>) {
        match self.messages.mark_read(message_id, reader) {
            Some(true) => {}
            Some(false) => return,
            None => {
                debug!("Read receipt for unknown message {}", message_id);
                return;
            }
        }
        let Some(message) = self.messages.find_by_id(message_id) else {
            return;
        };

        let target = if message.is_private {
            Target::Connection(message.sender_id)
        } else {
            Target::Room(
                message
                    .room
                    .clone()
                    .or_else(|| room_hint.filter(|r| !r.is_empty()))
                    .unwrap_or_else(|| GENERAL_ROOM.to_string()),
            )
        };
        let notice = ServerMessage::MessageRead {
            message_id: message.id.clone(),
            by: reader.to_string(),
        };
        self.deliver(&target, notice);
    }

    /// Handle reaction toggle
    fn handle_message_reaction(&mut self, who: &str, message_id: &str, emoji: &str) {
        if emoji.trim().is_empty() {
            return;
        }
        let Some(users) = self.messages.toggle_reaction(message_id, emoji, who) else {
            debug!("Reaction for unknown message {}", message_id);
            return;
        };
        let Some(message) = self.messages.find_by_id(message_id) else {
            return;
        };

        let notice = ServerMessage::MessageReaction {
            message_id: message.id.clone(),
            emoji: emoji.to_string(),
            users,
        };
        match (message.is_private, message.to) {
            (true, Some(to)) => {
                let sender = message.sender_id;
                self.deliver(&Target::Connection(to), notice.clone());
                if sender != to {
                    self.deliver(&Target::Connection(sender), notice);
                }
            }
            _ => {
                let room = message
                    .room
                    .clone()
                    .unwrap_or_else(|| GENERAL_ROOM.to_string());
                self.deliver(&Target::Room(room), notice);
            }
        }
    }

    fn handle_query(&self, query: Query) {
        match query {
            Query::Rooms { reply } => {
                let _ = reply.send(self.rooms.list_names());
            }
            Query::Users { reply } => {
                let _ = reply.send(self.clients.identities());
            }
            Query::Messages {
                room,
                page,
                page_size,
                reply,
            } => {
                let _ = reply.send(self.messages.page(&room, page, page_size));
            }
        }
    }

    /// Drop typing indicators that went silent and tell the affected rooms
    fn expire_typing(&mut self, now: Instant) {
        let Some(timeout) = self.config.typing_timeout else {
            return;
        };
        for room in self.typing.expire(now, timeout) {
            debug!("Typing expired in '{}'", room);
            self.broadcast_typing(&room, None);
        }
    }

    /// Send a room's typing list to its members
    ///
    /// With an origin, the origin receives it too even when not a member.
    fn broadcast_typing(&self, room: &str, origin: Option<ConnectionId>) {
        let notice = ServerMessage::TypingUsers {
            room: room.to_string(),
            users: self.typing.typing_in(room, None),
        };
        match origin {
            Some(origin) => {
                self.deliver(&Target::RoomExcept(room.to_string(), origin), notice.clone());
                self.deliver(&Target::Connection(origin), notice);
            }
            None => self.deliver(&Target::Room(room.to_string()), notice),
        }
    }

    /// Resolve a target against current state and queue the notification
    fn deliver(&self, target: &Target, msg: ServerMessage) {
        let recipients: Vec<ConnectionId> = match target {
            Target::Connection(id) => vec![*id],
            Target::Room(room) => self.rooms.members_of(room),
            Target::RoomExcept(room, skip) => self
                .rooms
                .members_of(room)
                .into_iter()
                .filter(|id| id != skip)
                .collect(),
            Target::All => self.clients.iter().map(|c| c.id).collect(),
        };

        for id in recipients {
            let Some(client) = self.clients.get(id) else {
                continue;
            };
            match client.send(msg.clone()) {
                Ok(()) => {}
                Err(SendError::ChannelFull) => {
                    warn!("Dropping {} for {}: queue full", msg.kind(), id);
                }
                Err(SendError::ChannelClosed) => {
                    debug!("Dropping {} for {}: connection closing", msg.kind(), id);
                }
            }
        }
    }

    fn rooms_list(&self) -> ServerMessage {
        ServerMessage::RoomsList {
            rooms: self.rooms.list_names(),
        }
    }

    fn user_list(&self) -> ServerMessage {
        ServerMessage::UserList {
            users: self.clients.identities(),
        }
    }

    /// Identified members of a room
    fn room_users(&self, room: &str) -> Vec<UserInfo> {
        self.rooms
            .members_of(room)
            .into_iter()
            .filter_map(|id| {
                self.clients.lookup(id).map(|username| UserInfo {
                    username: username.to_string(),
                    id,
                })
            })
            .collect()
    }
}

/// Room named by the client, or "general" when none was given
fn room_or_general(room: Option<String>) -> String {
    room.map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| GENERAL_ROOM.to_string())
}

/// Cloneable client of the ChatServer actor
#[derive(Debug, Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<ServerCommand>,
}

impl HubHandle {
    pub fn new(sender: mpsc::Sender<ServerCommand>) -> Self {
        Self { sender }
    }

    /// Start a ChatServer on the current runtime and return its handle
    pub fn spawn(config: HubConfig, buffer: usize) -> Self {
        let (sender, receiver) = mpsc::channel(buffer);
        tokio::spawn(ChatServer::new(receiver, config).run());
        Self { sender }
    }

    /// Raw command channel, as used by connection handlers
    pub fn sender(&self) -> mpsc::Sender<ServerCommand> {
        self.sender.clone()
    }

    async fn ask<T>(&self, query: impl FnOnce(oneshot::Sender<T>) -> Query) -> Result<T, AppError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(ServerCommand::Query(query(reply)))
            .await
            .map_err(|_| AppError::ChannelSend)?;
        response.await.map_err(|_| AppError::NoReply)
    }

    /// All room names
    pub async fn rooms(&self) -> Result<Vec<String>, AppError> {
        self.ask(|reply| Query::Rooms { reply }).await
    }

    /// All identified connections
    pub async fn users(&self) -> Result<Vec<UserInfo>, AppError> {
        self.ask(|reply| Query::Users { reply }).await
    }

    /// One page of a room's public messages
    pub async fn messages(&self, room: &str, page: usize, page_size: usize) -> Result<Page, AppError> {
        let room = room.to_string();
        self.ask(|reply| Query::Messages {
            room,
            page,
            page_size,
            reply,
        })
        .await
    }
}
