//! Session domain model.
//!
//! A session is a two-party paid conversation. The initiator opens it in
//! the pending state; only the recipient can accept it. Escrow state is
//! tracked separately and is advisory, the session status is what gates
//! access.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a session.
///
/// ```text
/// pending -> active -> completed
/// pending -> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created by the initiator, waiting for the recipient
    Pending,
    /// Accepted by the recipient; messaging is open
    Active,
    /// Finished by an external completion trigger
    Completed,
    /// Cancelled by a participant or expired while pending
    Cancelled,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this status can transition to another status.
    pub fn can_transition_to(&self, new_status: Self) -> bool {
        matches!(
            (self, new_status),
            (Self::Pending, Self::Active)
                | (Self::Pending, Self::Cancelled)
                | (Self::Active, Self::Completed)
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A paid conversation between an initiator and a recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub initiator_id: Uuid,
    pub recipient_id: Uuid,
    /// Price of the session in minor units
    pub amount: i64,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new pending session.
    pub fn new(initiator_id: Uuid, recipient_id: Uuid, amount: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            initiator_id,
            recipient_id,
            amount,
            status: SessionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Override the creation timestamp (used when importing legacy sessions).
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.initiator_id == user_id || self.recipient_id == user_id
    }

    /// The participant on the other side of `user_id`, if `user_id` takes part.
    pub fn counterpart_of(&self, user_id: Uuid) -> Option<Uuid> {
        if user_id == self.initiator_id {
            Some(self.recipient_id)
        } else if user_id == self.recipient_id {
            Some(self.initiator_id)
        } else {
            None
        }
    }

    /// Transition to a new status, updating the timestamp.
    pub fn transition_to(&mut self, new_status: SessionStatus) -> Result<(), String> {
        if !self.status.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }
        self.status = new_status;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Validate this session.
    pub fn validate(&self, min_amount: i64) -> Result<(), String> {
        if self.initiator_id == self.recipient_id {
            return Err("Initiator and recipient must be different users".to_string());
        }
        if self.amount <= 0 {
            return Err(format!("Session amount must be positive, got {}", self.amount));
        }
        if self.amount < min_amount {
            return Err(format!(
                "Session amount {} is below the minimum of {min_amount}",
                self.amount
            ));
        }
        Ok(())
    }
}
