//! Domain errors for the Parley service.

use thiserror::Error;
use uuid::Uuid;

use super::models::SessionStatus;

/// Domain-level errors that can occur in the Parley system.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Caller identity is missing")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Escrow record not found: {0}")]
    EscrowNotFound(Uuid),

    #[error("Summon not found: {0}")]
    SummonNotFound(Uuid),

    #[error("Message not found: {0}")]
    MessageNotFound(Uuid),

    #[error("Escrow link conflict: session {session_id} and escrow {escrow_id} are linked elsewhere")]
    AlreadyLinked { session_id: Uuid, escrow_id: Uuid },

    #[error("Escrow {escrow_id} does not pay session {session_id}: {reason}")]
    EscrowMismatch { session_id: Uuid, escrow_id: Uuid, reason: String },

    #[error("Backer {backer_id} has already backed summon {summon_id}")]
    AlreadyBacked { summon_id: Uuid, backer_id: Uuid },

    #[error("Session {session_id} is not pending (status: {status})")]
    NotPending { session_id: Uuid, status: SessionStatus },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: SessionStatus, to: SessionStatus },

    #[error("Session {0} is not active")]
    SessionNotActive(Uuid),

    #[error("Concurrency conflict: {entity} {id} was modified")]
    ConcurrencyConflict { entity: String, id: String },

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// True for the conflict family (409).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::AlreadyLinked { .. }
                | Self::AlreadyBacked { .. }
                | Self::NotPending { .. }
                | Self::InvalidStateTransition { .. }
                | Self::SessionNotActive(_)
                | Self::ConcurrencyConflict { .. }
        )
    }

    /// True for the not-found family (404).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound(_)
                | Self::EscrowNotFound(_)
                | Self::SummonNotFound(_)
                | Self::MessageNotFound(_)
        )
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

/// Returns true when a sqlx error is a UNIQUE constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

/// Returns true when SQLite reported lock contention (SQLITE_BUSY and its
/// extended codes), which callers treat as a retryable conflict.
pub fn is_busy(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| matches!(code.as_ref(), "5" | "261" | "517"))
}
