//! Message store
//!
//! Append-only, globally capped sequence of chat messages. Room queries never
//! see private messages. When the cap is exceeded the oldest message is
//! evicted, whatever room it belongs to.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConnectionId, MessageId, MessageIdGenerator};

/// Default number of retained messages
pub const DEFAULT_CAPACITY: usize = 2000;

/// Uploaded file descriptor as handed out by the blob store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    pub url: String,
}

/// A stored chat message
///
/// Only `read_by` and `reactions` change after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    /// None for private messages
    pub room: Option<String>,
    pub text: String,
    pub sender: String,
    pub sender_id: ConnectionId,
    pub timestamp: DateTime<Utc>,
    pub attachments: Vec<Attachment>,
    /// emoji -> identities that reacted with it
    pub reactions: BTreeMap<String, BTreeSet<String>>,
    pub read_by: BTreeSet<String>,
    pub is_private: bool,
    /// Target connection of a private message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<ConnectionId>,
}

/// Everything a sender supplies; the store fills in the rest
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub room: Option<String>,
    pub text: String,
    pub sender: String,
    pub sender_id: ConnectionId,
    pub attachments: Vec<Attachment>,
    pub to: Option<ConnectionId>,
}

impl NewMessage {
    /// A room message
    pub fn room(room: &str, sender: &str, sender_id: ConnectionId, text: String) -> Self {
        Self {
            room: Some(room.to_string()),
            text,
            sender: sender.to_string(),
            sender_id,
            attachments: Vec::new(),
            to: None,
        }
    }

    /// A 1:1 message addressed to `to`
    pub fn private(to: ConnectionId, sender: &str, sender_id: ConnectionId, text: String) -> Self {
        Self {
            room: None,
            text,
            sender: sender.to_string(),
            sender_id,
            attachments: Vec::new(),
            to: Some(to),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// One page of a room's history
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Chronological order
    pub messages: Vec<ChatMessage>,
    /// Non-private messages in the room
    pub total: usize,
}

#[derive(Debug)]
pub struct MessageStore {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
    ids: MessageIdGenerator,
}

impl MessageStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY) + 1),
            capacity: capacity.max(1),
            ids: MessageIdGenerator::new(),
        }
    }

    /// Store a message, evicting the oldest one if over capacity
    pub fn append(&mut self, new: NewMessage) -> ChatMessage {
        let message = ChatMessage {
            id: self.ids.next_id(),
            is_private: new.to.is_some(),
            room: new.room,
            text: new.text,
            read_by: BTreeSet::from([new.sender.clone()]),
            sender: new.sender,
            sender_id: new.sender_id,
            timestamp: Utc::now(),
            attachments: new.attachments,
            reactions: BTreeMap::new(),
            to: new.to,
        };
        self.messages.push_back(message.clone());
        if self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
        message
    }

    pub fn find_by_id(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.id.as_str() == id)
    }

    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().rev().find(|m| m.id.as_str() == id)
    }

    /// Add a reader to a message's read set
    ///
    /// Returns None for unknown messages, otherwise whether the set changed.
    pub fn mark_read(&mut self, id: &str, reader: &str) -> Option<bool> {
        let message = self.find_by_id_mut(id)?;
        Some(message.read_by.insert(reader.to_string()))
    }

    /// Flip one identity's reaction with one emoji
    ///
    /// Returns the identities still reacting with that emoji, or None for
    /// unknown messages.
    pub fn toggle_reaction(&mut self, id: &str, emoji: &str, who: &str) -> Option<Vec<String>> {
        let message = self.find_by_id_mut(id)?;
        let reactors = message.reactions.entry(emoji.to_string()).or_default();
        if !reactors.remove(who) {
            reactors.insert(who.to_string());
        }
        let users: Vec<String> = reactors.iter().cloned().collect();
        if users.is_empty() {
            message.reactions.remove(emoji);
        }
        Some(users)
    }

    fn room_messages<'a>(&'a self, room: &'a str) -> impl Iterator<Item = &'a ChatMessage> + 'a {
        self.messages
            .iter()
            .filter(move |m| !m.is_private && m.room.as_deref() == Some(room))
    }

    /// Latest `limit` public messages of a room, oldest first
    pub fn history(&self, room: &str, limit: usize) -> Vec<ChatMessage> {
        let matching: Vec<&ChatMessage> = self.room_messages(room).collect();
        let start = matching.len().saturating_sub(limit);
        matching[start..].iter().map(|m| (*m).clone()).collect()
    }

    /// Page through a room's public messages, newest page first
    ///
    /// `page` starts at 1. A page reaching past the oldest message is clamped.
    pub fn page(&self, room: &str, page: usize, page_size: usize) -> Page {
        let matching: Vec<&ChatMessage> = self.room_messages(room).collect();
        let total = matching.len();
        let skip = page.saturating_sub(1).saturating_mul(page_size);
        let end = total.saturating_sub(skip);
        let start = end.saturating_sub(page_size);
        Page {
            messages: matching[start..end].iter().map(|m| (*m).clone()).collect(),
            total,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(store: &mut MessageStore, room: &str, text: &str) -> ChatMessage {
        store.append(NewMessage::room(room, "alice", ConnectionId::new(), text.to_string()))
    }

    #[test]
    fn test_append_initializes_fields() {
        let mut store = MessageStore::default();
        let msg = post(&mut store, "general", "hi");

        assert_eq!(msg.room.as_deref(), Some("general"));
        assert!(!msg.is_private);
        assert!(msg.to.is_none());
        assert!(msg.reactions.is_empty());
        assert_eq!(msg.read_by.iter().collect::<Vec<_>>(), vec!["alice"]);
        assert_eq!(store.find_by_id(msg.id.as_str()), Some(&msg));
    }

    #[test]
    fn test_cap_evicts_oldest_only() {
        let mut store = MessageStore::default();
        let first = post(&mut store, "general", "0");
        let second = post(&mut store, "general", "1");
        for i in 2..=DEFAULT_CAPACITY {
            post(&mut store, "general", &i.to_string());
        }

        assert_eq!(store.len(), DEFAULT_CAPACITY);
        assert!(store.find_by_id(first.id.as_str()).is_none());
        assert!(store.find_by_id(second.id.as_str()).is_some());
    }

    #[test]
    fn test_cap_ignores_room_and_privacy() {
        let mut store = MessageStore::new(2);
        let private = store.append(NewMessage::private(
            ConnectionId::new(),
            "alice",
            ConnectionId::new(),
            "psst".to_string(),
        ));
        post(&mut store, "a", "1");
        post(&mut store, "b", "2");

        assert_eq!(store.len(), 2);
        assert!(store.find_by_id(private.id.as_str()).is_none());
    }

    #[test]
    fn test_history_excludes_private_and_other_rooms() {
        let mut store = MessageStore::default();
        post(&mut store, "general", "one");
        post(&mut store, "rust", "elsewhere");
        store.append(NewMessage::private(
            ConnectionId::new(),
            "alice",
            ConnectionId::new(),
            "secret".to_string(),
        ));
        post(&mut store, "general", "two");
        post(&mut store, "general", "three");

        let texts: Vec<_> = store
            .history("general", 2)
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["two", "three"]);
        assert_eq!(store.history("general", 50).len(), 3);
    }

    #[test]
    fn test_mark_read_is_idempotent() {
        let mut store = MessageStore::default();
        let msg = post(&mut store, "general", "hi");

        assert_eq!(store.mark_read(msg.id.as_str(), "bob"), Some(true));
        let after_first = store.find_by_id(msg.id.as_str()).unwrap().read_by.clone();
        assert_eq!(store.mark_read(msg.id.as_str(), "bob"), Some(false));
        assert_eq!(store.find_by_id(msg.id.as_str()).unwrap().read_by, after_first);
        assert_eq!(after_first.len(), 2);

        assert_eq!(store.mark_read("missing", "bob"), None);
    }

    #[test]
    fn test_reaction_toggle_parity() {
        let mut store = MessageStore::default();
        let msg = post(&mut store, "general", "hi");
        let id = msg.id.as_str();

        assert_eq!(store.toggle_reaction(id, "👍", "bob"), Some(vec!["bob".to_string()]));
        assert_eq!(store.toggle_reaction(id, "👍", "bob"), Some(vec![]));
        assert!(store.find_by_id(id).unwrap().reactions.is_empty());

        store.toggle_reaction(id, "👍", "bob");
        store.toggle_reaction(id, "👍", "carol");
        assert_eq!(
            store.toggle_reaction(id, "👍", "bob"),
            Some(vec!["carol".to_string()])
        );
        assert_eq!(store.toggle_reaction("missing", "👍", "bob"), None);
    }

    #[test]
    fn test_page_windows() {
        let mut store = MessageStore::default();
        for i in 0..7 {
            post(&mut store, "general", &i.to_string());
        }

        let texts = |p: Page| p.messages.into_iter().map(|m| m.text).collect::<Vec<_>>();

        let first = store.page("general", 1, 3);
        assert_eq!(first.total, 7);
        assert_eq!(texts(first), vec!["4", "5", "6"]);
        assert_eq!(texts(store.page("general", 2, 3)), vec!["1", "2", "3"]);
        assert_eq!(texts(store.page("general", 3, 3)), vec!["0"]);
        assert!(store.page("general", 4, 3).messages.is_empty());
        assert_eq!(store.page("empty", 1, 3), Page { messages: vec![], total: 0 });
    }

    #[test]
    fn test_pages_reconstruct_history() {
        let mut store = MessageStore::default();
        let mut expected = Vec::new();
        for i in 0..23 {
            expected.push(post(&mut store, "general", &i.to_string()).id);
            post(&mut store, "other", "noise");
        }

        let page_size = 5;
        let mut pages = Vec::new();
        let mut n = 1;
        loop {
            let page = store.page("general", n, page_size);
            if page.messages.is_empty() {
                break;
            }
            pages.push(page.messages);
            n += 1;
        }

        assert_eq!(pages[0].len(), page_size);
        let rebuilt: Vec<MessageId> = pages
            .into_iter()
            .rev()
            .flatten()
            .map(|m| m.id)
            .collect();
        assert_eq!(rebuilt, expected);
    }

    #[test]
    fn test_message_serializes_camel_case() {
        let mut store = MessageStore::default();
        let to = ConnectionId::new();
        let msg = store.append(NewMessage::private(to, "alice", ConnectionId::new(), "x".to_string()));
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["isPrivate"], true);
        assert_eq!(json["to"], to.to_string());
        assert!(json["room"].is_null());
        assert_eq!(json["readBy"], serde_json::json!(["alice"]));
        assert!(json.get("senderId").is_some());
    }
}
