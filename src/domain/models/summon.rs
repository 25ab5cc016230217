//! Summon (crowd-pledge) domain model.
//!
//! A summon is an append-only pledge ledger aimed at attracting a target
//! person. Its aggregate (`total_pledged`, `backer_count`) is always derived
//! from the backer entries:
//!
//! - `total_pledged == entries.iter().map(|e| e.amount).sum()`
//! - `backer_count == entries.len()`
//! - no two entries share a backer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who the summon is trying to attract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummonTarget {
    /// Display name of the target
    pub name: String,
    /// Optional external handle (social account, ENS name, ...)
    #[serde(default)]
    pub handle: Option<String>,
}

impl SummonTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), handle: None }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }
}

/// A single pledge. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackerEntry {
    pub backer_id: Uuid,
    pub amount: i64,
    pub backed_at: DateTime<Utc>,
}

impl BackerEntry {
    pub fn new(backer_id: Uuid, amount: i64) -> Self {
        Self { backer_id, amount, backed_at: Utc::now() }
    }
}

/// A crowd-pledge ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summon {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub target: SummonTarget,
    /// Backer entries in append order
    pub entries: Vec<BackerEntry>,
    pub total_pledged: i64,
    pub backer_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Version for compare-and-swap on the aggregate
    pub version: u64,
}

impl Summon {
    /// Create an empty summon.
    pub fn new(creator_id: Uuid, target: SummonTarget) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            creator_id,
            target,
            entries: Vec::new(),
            total_pledged: 0,
            backer_count: 0,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    pub fn has_backer(&self, backer_id: Uuid) -> bool {
        self.entries.iter().any(|e| e.backer_id == backer_id)
    }

    /// The running total after a further pledge of `amount`, or `None` if
    /// it would not fit.
    pub fn total_after(&self, amount: i64) -> Option<i64> {
        self.total_pledged.checked_add(amount)
    }

    /// Check that the aggregate matches the entries.
    pub fn is_consistent(&self) -> bool {
        let sum = self.entries.iter().try_fold(0i64, |acc, e| acc.checked_add(e.amount));
        let mut backers: Vec<Uuid> = self.entries.iter().map(|e| e.backer_id).collect();
        backers.sort_unstable();
        backers.dedup();

        sum == Some(self.total_pledged)
            && self.backer_count == self.entries.len() as i64
            && backers.len() == self.entries.len()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.target.name.trim().is_empty() {
            return Err("Summon target name cannot be empty".to_string());
        }
        if self.target.name.len() > 255 {
            return Err("Summon target name cannot exceed 255 characters".to_string());
        }
        Ok(())
    }
}

/// Lifetime pledge counters for a backer.
///
/// Best-effort bookkeeping; recomputable from the summon ledgers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackerStats {
    pub backer_id: Uuid,
    pub pledge_count: i64,
    pub total_pledged: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_entries(amounts: &[i64]) -> Summon {
        let mut summon = Summon::new(Uuid::new_v4(), SummonTarget::new("Ada"));
        for &amount in amounts {
            summon.entries.push(BackerEntry::new(Uuid::new_v4(), amount));
            summon.total_pledged += amount;
            summon.backer_count += 1;
        }
        summon
    }

    #[test]
    fn test_aggregate_matches_entries() {
        let summon = with_entries(&[25, 75]);
        assert_eq!(summon.total_pledged, 100);
        assert!(summon.is_consistent());
    }

    #[test]
    fn test_inconsistent_aggregate_is_detected() {
        let mut summon = with_entries(&[10]);
        summon.total_pledged = 11;
        assert!(!summon.is_consistent());

        let mut repeated = with_entries(&[10]);
        let again = repeated.entries[0].clone();
        repeated.entries.push(again);
        repeated.total_pledged = 20;
        repeated.backer_count = 2;
        assert!(!repeated.is_consistent());
    }

    #[test]
    fn test_total_after_refuses_overflow() {
        let summon = with_entries(&[i64::MAX - 1]);
        assert_eq!(summon.total_after(1), Some(i64::MAX));
        assert_eq!(summon.total_after(2), None);
    }

    #[test]
    fn test_validate_target_name() {
        let blank = Summon::new(Uuid::new_v4(), SummonTarget::new("  "));
        assert!(blank.validate().is_err());
        assert!(with_entries(&[]).validate().is_ok());
    }
}
