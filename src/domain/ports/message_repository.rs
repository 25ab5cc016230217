//! Message repository port (the durable log).

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Message;

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Append a message to its session's log.
    async fn append(&self, message: &Message) -> DomainResult<()>;

    /// Get a message by durable id.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Message>>;

    /// All messages of a session in insertion order.
    async fn list_for_session(&self, session_id: Uuid) -> DomainResult<Vec<Message>>;

    /// Set the read flag. Returns `false` if the message does not exist.
    async fn mark_read(&self, id: Uuid) -> DomainResult<bool>;
}
