//! Broadcast channel port.

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::ChangeEvent;

/// An item delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Change(ChangeEvent),
    /// The subscriber fell behind and `n` events were dropped
    Lagged(u64),
}

/// Stream of deliveries for one session. Ends when the channel goes away.
pub type Subscription = BoxStream<'static, Delivery>;

/// Publish/subscribe keyed by session id.
#[async_trait]
pub trait BroadcastChannel: Send + Sync {
    /// Publish a change to every subscriber of the event's session.
    async fn publish(&self, event: ChangeEvent) -> DomainResult<()>;

    /// Subscribe to a session. Fails with `DependencyUnavailable` when the
    /// channel is down.
    async fn subscribe(&self, session_id: Uuid) -> DomainResult<Subscription>;
}
