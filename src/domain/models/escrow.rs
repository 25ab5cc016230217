//! Escrow record domain model.
//!
//! An escrow record mirrors an on-chain deposit observed by the chain
//! watcher. Records arrive independently of sessions and are linked later,
//! either by an explicit reference or by the legacy deposit matching rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of an escrow record as mirrored from the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    Pending,
    Accepted,
    Released,
    Disputed,
}

impl Default for EscrowStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl EscrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Released => "released",
            Self::Disputed => "disputed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "released" => Some(Self::Released),
            "disputed" => Some(Self::Disputed),
            _ => None,
        }
    }
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize an on-chain address for comparison.
///
/// Hex addresses are case-insensitive (checksummed casing is presentation only).
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Off-chain mirror of an on-chain escrow deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRecord {
    pub id: Uuid,
    /// Correlation id assigned by the escrow contract (e.g. a deposit id or tx hash)
    pub external_id: String,
    pub depositor_address: String,
    pub recipient_address: String,
    /// Deposited amount in minor units
    pub amount: i64,
    pub status: EscrowStatus,
    /// Linked session. Set once, never replaced.
    pub session_id: Option<Uuid>,
    pub accept_deadline: Option<DateTime<Utc>>,
    pub dispute_deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl EscrowRecord {
    /// Create a new, unlinked escrow record.
    pub fn new(
        external_id: impl Into<String>,
        depositor_address: &str,
        recipient_address: &str,
        amount: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id: external_id.into(),
            depositor_address: normalize_address(depositor_address),
            recipient_address: normalize_address(recipient_address),
            amount,
            status: EscrowStatus::Pending,
            session_id: None,
            accept_deadline: None,
            dispute_deadline: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_deadlines(
        mut self,
        accept_deadline: Option<DateTime<Utc>>,
        dispute_deadline: Option<DateTime<Utc>>,
    ) -> Self {
        self.accept_deadline = accept_deadline;
        self.dispute_deadline = dispute_deadline;
        self
    }

    pub fn is_linked(&self) -> bool {
        self.session_id.is_some()
    }

    /// Validate this record.
    pub fn validate(&self) -> Result<(), String> {
        if self.external_id.trim().is_empty() {
            return Err("Escrow external id cannot be empty".to_string());
        }
        if self.recipient_address.is_empty() {
            return Err("Escrow recipient address cannot be empty".to_string());
        }
        if self.amount <= 0 {
            return Err(format!("Escrow amount must be positive, got {}", self.amount));
        }
        Ok(())
    }
}

/// An on-chain address registered by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: Uuid,
    pub address: String,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(user_id: Uuid, address: &str, is_primary: bool) -> Self {
        Self {
            user_id,
            address: normalize_address(address),
            is_primary,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addresses_are_normalized() {
        let record = EscrowRecord::new("dep-1", "0xDEAD", " 0xABC ", 50);
        assert_eq!(record.recipient_address, "0xabc");
        assert_eq!(record.depositor_address, "0xdead");
        assert_eq!(Wallet::new(Uuid::new_v4(), "0xABC", true).address, "0xabc");
    }

    #[test]
    fn test_validate() {
        assert!(EscrowRecord::new("dep-1", "0x1", "0x2", 50).validate().is_ok());
        assert!(EscrowRecord::new("", "0x1", "0x2", 50).validate().is_err());
        assert!(EscrowRecord::new("dep-1", "0x1", "0x2", 0).validate().is_err());
    }
}
