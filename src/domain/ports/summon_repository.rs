//! Summon (pledge ledger) repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{BackerEntry, BackerStats, Summon};

#[async_trait]
pub trait SummonRepository: Send + Sync {
    /// Create an empty summon.
    async fn create(&self, summon: &Summon) -> DomainResult<()>;

    /// Load a summon with its entries in append order.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Summon>>;

    /// Append an entry and bump the aggregate as one atomic unit.
    ///
    /// The write only applies if the stored version still equals
    /// `expected_version`; otherwise `ConcurrencyConflict` is returned and
    /// nothing is written. A backer already present yields `AlreadyBacked`.
    async fn append_entry(
        &self,
        summon_id: Uuid,
        entry: &BackerEntry,
        expected_version: u64,
    ) -> DomainResult<Summon>;

    /// Increment a backer's lifetime counters.
    async fn increment_backer_stats(&self, backer_id: Uuid, amount: i64) -> DomainResult<()>;

    /// Read a backer's lifetime counters.
    async fn backer_stats(&self, backer_id: Uuid) -> DomainResult<BackerStats>;

    /// Rebuild a backer's lifetime counters from the ledger entries.
    async fn recompute_backer_stats(&self, backer_id: Uuid) -> DomainResult<BackerStats>;
}
