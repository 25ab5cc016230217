//! Escrow ledger source port.
//!
//! Read side of the off-chain mirror of escrow deposits, plus the narrow
//! write surface the service needs (status and link fields).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{EscrowRecord, EscrowStatus};

/// Outcome of a conditional link write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The link was written by this call
    Linked,
    /// The record was already linked to the same session
    AlreadyLinkedToSession,
    /// The record or the session is linked elsewhere; nothing was written
    Conflict,
}

#[async_trait]
pub trait EscrowRepository: Send + Sync {
    /// Store a record received from the chain watcher.
    async fn create(&self, record: &EscrowRecord) -> DomainResult<()>;

    /// Get a record by internal id.
    async fn get(&self, id: Uuid) -> DomainResult<Option<EscrowRecord>>;

    /// Get a record by the contract's correlation id.
    async fn get_by_external_id(&self, external_id: &str) -> DomainResult<Option<EscrowRecord>>;

    /// Records already linked to a session.
    async fn find_by_session(&self, session_id: Uuid) -> DomainResult<Vec<EscrowRecord>>;

    /// Unlinked records paying `amount` to `recipient_address`, created within `[from, to]`.
    async fn find_unlinked(
        &self,
        recipient_address: &str,
        amount: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DomainResult<Vec<EscrowRecord>>;

    /// Set the session link unless either side is already linked.
    async fn try_link(&self, escrow_id: Uuid, session_id: Uuid) -> DomainResult<LinkOutcome>;

    /// Overwrite the mirrored status.
    async fn update_status(&self, escrow_id: Uuid, status: EscrowStatus) -> DomainResult<()>;
}
