//! Typing presence tracker
//!
//! One record per connection that is currently typing in a room. Private
//! (1:1) typing indicators never land here.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use crate::types::ConnectionId;

/// A connection that is typing in a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingRecord {
    pub username: String,
    pub room: String,
    /// Last time the connection signalled typing
    pub since: Instant,
}

#[derive(Debug, Default)]
pub struct TypingTracker {
    typing: HashMap<ConnectionId, TypingRecord>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record or refresh a typing entry
    ///
    /// Returns the room of the replaced entry when the connection moved rooms.
    pub fn set_typing(&mut self, id: ConnectionId, username: &str, room: &str) -> Option<String> {
        let previous = self.typing.insert(
            id,
            TypingRecord {
                username: username.to_string(),
                room: room.to_string(),
                since: Instant::now(),
            },
        );
        previous.map(|p| p.room).filter(|r| r != room)
    }

    pub fn clear_typing(&mut self, id: ConnectionId) -> Option<TypingRecord> {
        self.typing.remove(&id)
    }

    /// Identities typing in a room, sorted, optionally leaving one connection out
    pub fn typing_in(&self, room: &str, excluding: Option<ConnectionId>) -> Vec<String> {
        let mut users: Vec<String> = self
            .typing
            .iter()
            .filter(|(id, rec)| rec.room == room && Some(**id) != excluding)
            .map(|(_, rec)| rec.username.clone())
            .collect();
        users.sort();
        users
    }

    /// Drop entries that have been silent for longer than `timeout`
    ///
    /// Returns the rooms whose typing list changed.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> BTreeSet<String> {
        let mut rooms = BTreeSet::new();
        self.typing.retain(|_, rec| {
            let alive = now.saturating_duration_since(rec.since) <= timeout;
            if !alive {
                rooms.insert(rec.room.clone());
            }
            alive
        });
        rooms
    }

    pub fn is_typing(&self, id: ConnectionId) -> bool {
        self.typing.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.typing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.typing.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let mut tracker = TypingTracker::new();
        let id = ConnectionId::new();

        tracker.set_typing(id, "alice", "general");
        assert_eq!(tracker.typing_in("general", None), vec!["alice"]);

        let removed = tracker.clear_typing(id).unwrap();
        assert_eq!(removed.room, "general");
        assert!(tracker.typing_in("general", None).is_empty());
        assert!(tracker.clear_typing(id).is_none());
    }

    #[test]
    fn test_typing_is_room_scoped() {
        let mut tracker = TypingTracker::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        tracker.set_typing(a, "alice", "general");
        tracker.set_typing(b, "bob", "rust");

        assert_eq!(tracker.typing_in("general", None), vec!["alice"]);
        assert_eq!(tracker.typing_in("rust", None), vec!["bob"]);
    }

    #[test]
    fn test_typing_in_excluding() {
        let mut tracker = TypingTracker::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        tracker.set_typing(a, "alice", "general");
        tracker.set_typing(b, "bob", "general");

        assert_eq!(tracker.typing_in("general", Some(a)), vec!["bob"]);
        assert_eq!(tracker.typing_in("general", None), vec!["alice", "bob"]);
    }

    #[test]
    fn test_overwrite_reports_moved_room() {
        let mut tracker = TypingTracker::new();
        let id = ConnectionId::new();

        assert_eq!(tracker.set_typing(id, "alice", "general"), None);
        assert_eq!(tracker.set_typing(id, "alice", "general"), None);
        assert_eq!(tracker.set_typing(id, "alice", "rust"), Some("general".to_string()));
        assert_eq!(tracker.len(), 1);
        assert!(tracker.typing_in("general", None).is_empty());
    }

    #[test]
    fn test_expire_silent_entries() {
        let mut tracker = TypingTracker::new();
        let id = ConnectionId::new();
        tracker.set_typing(id, "alice", "general");

        let rooms = tracker.expire(Instant::now(), Duration::from_secs(60));
        assert!(rooms.is_empty());
        assert!(tracker.is_typing(id));

        let later = Instant::now() + Duration::from_secs(61);
        let rooms = tracker.expire(later, Duration::from_secs(60));
        assert_eq!(rooms.into_iter().collect::<Vec<_>>(), vec!["general".to_string()]);
        assert!(tracker.is_empty());
    }
}
