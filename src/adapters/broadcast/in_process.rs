//! In-process broadcast hub backed by one `tokio::sync::broadcast` channel per session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::ChangeEvent;
use crate::domain::ports::{BroadcastChannel, Delivery, Subscription};

/// Per-session fan-out of durable log changes.
///
/// A channel exists only while the session has subscribers: it is created on
/// subscribe and dropped once its last receiver is gone. Publishing to a
/// session without subscribers is a no-op. After [`close`](Self::close)
/// every open subscription ends and new subscriptions are refused.
#[derive(Clone)]
pub struct InProcessBroadcast {
    channels: Arc<RwLock<HashMap<Uuid, broadcast::Sender<ChangeEvent>>>>,
    closed: Arc<AtomicBool>,
    capacity: usize,
}

impl InProcessBroadcast {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            closed: Arc::new(AtomicBool::new(false)),
            capacity: capacity.max(1),
        }
    }

    /// Tear the hub down. Dropping the senders ends every subscriber stream.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut channels = self.channels.write().await;
        let count = channels.len();
        channels.clear();
        tracing::info!(channels = count, "broadcast hub closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Drop the session's channel if nobody listens on it anymore.
    async fn release_if_idle(&self, session_id: Uuid) {
        let mut channels = self.channels.write().await;
        if channels.get(&session_id).is_some_and(|tx| tx.receiver_count() == 0) {
            channels.remove(&session_id);
            tracing::trace!(%session_id, "released idle broadcast channel");
        }
    }

    #[cfg(test)]
    async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

#[async_trait]
impl BroadcastChannel for InProcessBroadcast {
    async fn publish(&self, event: ChangeEvent) -> DomainResult<()> {
        if self.is_closed() {
            return Err(DomainError::DependencyUnavailable("broadcast hub is closed".to_string()));
        }
        let session_id = event.session_id;
        let Some(tx) = self.channels.read().await.get(&session_id).cloned() else {
            return Ok(());
        };
        if tx.send(event).is_err() {
            self.release_if_idle(session_id).await;
        }
        Ok(())
    }

    async fn subscribe(&self, session_id: Uuid) -> DomainResult<Subscription> {
        if self.is_closed() {
            return Err(DomainError::DependencyUnavailable("broadcast hub is closed".to_string()));
        }
        let rx = {
            let mut channels = self.channels.write().await;
            if !channels.contains_key(&session_id) {
                // Sweep sessions whose subscribers left without a later publish
                channels.retain(|_, tx| tx.receiver_count() > 0);
            }
            channels
                .entry(session_id)
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };

        let deliveries = stream::unfold(rx, |mut rx| async move {
            match rx.recv().await {
                Ok(event) => Some((Delivery::Change(event), rx)),
                Err(broadcast::error::RecvError::Lagged(n)) => Some((Delivery::Lagged(n), rx)),
                Err(broadcast::error::RecvError::Closed) => None,
            }
        });

        Ok(deliveries.boxed())
    }
}
