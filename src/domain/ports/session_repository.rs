//! Session repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Session, SessionStatus};

/// Repository interface for Session persistence.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new session.
    async fn create(&self, session: &Session) -> DomainResult<()>;

    /// Get a session by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Session>>;

    /// Conditionally move a session from `from` to `to`.
    ///
    /// Returns `false` when the stored status is no longer `from`, so
    /// concurrent transitions cannot both win.
    async fn transition(
        &self,
        id: Uuid,
        from: SessionStatus,
        to: SessionStatus,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<bool>;

    /// Pending sessions created before `cutoff`.
    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> DomainResult<Vec<Session>>;
}
