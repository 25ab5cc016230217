//! Notification sink port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::Notification;

/// Fire-and-forget notification delivery.
///
/// Callers treat failures as best-effort: they are logged, never surfaced.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification) -> DomainResult<()>;
}
