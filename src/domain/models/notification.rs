//! Notification events handed to the notification sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event types the service emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SessionRequested,
    SessionAccepted,
    SessionCancelled,
    NewMessage,
    SummonBacked,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionRequested => "session_requested",
            Self::SessionAccepted => "session_accepted",
            Self::SessionCancelled => "session_cancelled",
            Self::NewMessage => "new_message",
            Self::SummonBacked => "summon_backed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "session_requested" => Some(Self::SessionRequested),
            "session_accepted" => Some(Self::SessionAccepted),
            "session_cancelled" => Some(Self::SessionCancelled),
            "new_message" => Some(Self::NewMessage),
            "summon_backed" => Some(Self::SummonBacked),
            _ => None,
        }
    }
}

/// A fire-and-forget notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub target_user: Uuid,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotificationKind, target_user: Uuid, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            target_user,
            payload,
            created_at: Utc::now(),
        }
    }
}
