//! Room directory
//!
//! Maps room names to membership sets. Rooms are created implicitly on
//! join (or explicitly on create) and live for the rest of the process.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{ConnectionId, GENERAL_ROOM};

/// Named chat room
///
/// Membership doubles as the subscriber list for room-targeted
/// notifications.
#[derive(Debug)]
pub struct Room {
    /// Room name (unique key)
    pub name: String,
    /// Current members
    pub members: BTreeSet<ConnectionId>,
}

impl Room {
    /// Create an empty room
    pub fn new(name: String) -> Self {
        Self {
            name,
            members: BTreeSet::new(),
        }
    }

    /// Check if a connection is in this room
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.contains(&id)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

/// All known rooms: name -> Room
#[derive(Debug)]
pub struct RoomDirectory {
    rooms: BTreeMap<String, Room>,
}

impl RoomDirectory {
    /// Create a directory holding only the empty "general" room
    pub fn new() -> Self {
        let mut directory = Self {
            rooms: BTreeMap::new(),
        };
        directory.ensure_room(GENERAL_ROOM);
        directory
    }

    /// Create the room if absent
    ///
    /// Returns true when the room was created by this call.
    pub fn ensure_room(&mut self, name: &str) -> bool {
        if self.rooms.contains_key(name) {
            return false;
        }
        self.rooms.insert(name.to_string(), Room::new(name.to_string()));
        true
    }

    /// Add a connection to a room, creating it if needed
    ///
    /// Returns true when the connection was not already a member.
    pub fn join(&mut self, name: &str, id: ConnectionId) -> bool {
        self.ensure_room(name);
        self.rooms
            .get_mut(name)
            .map(|room| room.members.insert(id))
            .unwrap_or(false)
    }

    /// Remove a connection from a room
    ///
    /// Returns true if the connection was a member.
    pub fn leave(&mut self, name: &str, id: ConnectionId) -> bool {
        self.rooms
            .get_mut(name)
            .map(|room| room.members.remove(&id))
            .unwrap_or(false)
    }

    /// Drop a connection from every room
    pub fn remove_everywhere(&mut self, id: ConnectionId) {
        for room in self.rooms.values_mut() {
            room.members.remove(&id);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rooms.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Room> {
        self.rooms.get(name)
    }

    /// All room names, sorted
    pub fn list_names(&self) -> Vec<String> {
        self.rooms.keys().cloned().collect()
    }

    /// Members of a room (empty for unknown rooms)
    pub fn members_of(&self, name: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(name)
            .map(|room| room.members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl Default for RoomDirectory {
    fn default() -> Self {
        Self::new()
    }
}
