//! The durable message log as seen by a single viewer.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Message;

#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Durably append a message and return the authoritative row.
    async fn append(&self, session_id: Uuid, sender_id: Uuid, content: &str)
        -> DomainResult<Message>;

    /// Fetch the full log of a session as `viewer_id`.
    async fn fetch(&self, session_id: Uuid, viewer_id: Uuid) -> DomainResult<Vec<Message>>;
}
