//! Message domain model and durable-log change events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A durably stored message in a session's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(session_id: Uuid, sender_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            sender_id,
            content: content.into(),
            is_read: false,
            created_at: Utc::now(),
        }
    }

    /// Content-based identity used to match optimistic writes.
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(self.sender_id, &self.content, self.session_id)
    }
}

/// `(sender, content, session)` identity of a message before it has a durable id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub sender_id: Uuid,
    pub content: String,
    pub session_id: Uuid,
}

impl DedupKey {
    pub fn new(sender_id: Uuid, content: &str, session_id: Uuid) -> Self {
        Self { sender_id, content: content.to_string(), session_id }
    }
}

/// Kind of change observed on the durable log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
}

/// A change to a session's durable log, as delivered by the broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub session_id: Uuid,
    /// Row before the change (absent for inserts)
    pub old: Option<Message>,
    /// Row after the change
    pub new: Message,
}

impl ChangeEvent {
    pub fn insert(message: Message) -> Self {
        Self {
            kind: ChangeKind::Insert,
            session_id: message.session_id,
            old: None,
            new: message,
        }
    }

    pub fn update(old: Message, new: Message) -> Self {
        Self {
            kind: ChangeKind::Update,
            session_id: new.session_id,
            old: Some(old),
            new,
        }
    }
}
