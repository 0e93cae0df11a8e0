//! Connection registry
//!
//! A `Client` is one live connection with its identity, joined rooms and
//! outbound channel. `ClientRegistry` owns every live `Client`.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::ConnectionId;

/// Connected client information
///
/// Holds all state related to a connected client including their
/// unique ID, identity, joined rooms and message sender channel.
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Display identity (None before identify)
    pub username: Option<String>,
    /// Rooms this connection has joined
    pub rooms: BTreeSet<String>,
    /// Server → Client message channel
    pub sender: mpsc::Sender<ServerMessage>,
}

impl Client {
    /// Create a new client with the given ID and sender channel
    pub fn new(id: ConnectionId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            username: None,
            rooms: BTreeSet::new(),
            sender,
        }
    }

    /// Queue a message for this client
    ///
    /// Never waits: a full queue drops the message.
    pub fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Check if this client has identified itself
    pub fn is_identified(&self) -> bool {
        self.username.is_some()
    }
}

/// Public view of an identified connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub username: String,
    pub id: ConnectionId,
}

/// All live connections: ConnectionId -> Client
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<ConnectionId, Client>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a freshly accepted, not yet identified connection
    pub fn register(&mut self, id: ConnectionId, sender: mpsc::Sender<ServerMessage>) {
        self.clients.insert(id, Client::new(id, sender));
    }

    /// Bind an identity to a connection
    ///
    /// Overwrites any previous identity. Returns false for unknown connections.
    pub fn identify(&mut self, id: ConnectionId, username: String) -> bool {
        match self.clients.get_mut(&id) {
            Some(client) => {
                client.username = Some(username);
                true
            }
            None => false,
        }
    }

    /// Remove a connection, handing back its final state
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Client> {
        self.clients.remove(&id)
    }

    /// Resolve who is speaking on a connection
    pub fn lookup(&self, id: ConnectionId) -> Option<&str> {
        self.clients.get(&id).and_then(|c| c.username.as_deref())
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Client> {
        self.clients.get_mut(&id)
    }

    /// Every live connection, identified or not
    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    /// Snapshot of identified connections, ordered by username
    pub fn identities(&self) -> Vec<UserInfo> {
        let mut users: Vec<UserInfo> = self
            .clients
            .values()
            .filter_map(|c| {
                c.username.as_ref().map(|username| UserInfo {
                    username: username.clone(),
                    id: c.id,
                })
            })
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username).then(a.id.cmp(&b.id)));
        users
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
