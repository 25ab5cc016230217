//! Client-side message stream reconciler.
//!
//! A [`MessageView`] holds one viewer's picture of a session log: durable
//! messages plus optimistic entries for sends that have not been confirmed
//! yet. A [`MessageStream`] drives the view from the broadcast channel and
//! falls back to periodic full re-fetches while the channel is unavailable.
//!
//! Invariants held by the view:
//! - a durable id appears at most once
//! - an optimistic entry is replaced in place by its confirmation, so the
//!   order of already rendered entries never changes

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ChangeEvent, ChangeKind, DedupKey, Message};
use crate::domain::ports::{BroadcastChannel, Delivery, MessageLog, Subscription};

/// One rendered line of the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageEntry {
    /// Sent locally, awaiting confirmation. `message.id` is a local temporary id.
    Pending { key: DedupKey, message: Message },
    Confirmed(Message),
}

impl MessageEntry {
    pub fn message(&self) -> &Message {
        match self {
            Self::Pending { message, .. } | Self::Confirmed(message) => message,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

/// A viewer's reconciled copy of one session's log.
#[derive(Debug, Clone)]
pub struct MessageView {
    session_id: Uuid,
    entries: Vec<MessageEntry>,
    durable_ids: HashSet<Uuid>,
}

impl MessageView {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            entries: Vec::new(),
            durable_ids: HashSet::new(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn entries(&self) -> &[MessageEntry] {
        &self.entries
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().map(MessageEntry::message)
    }

    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_pending()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render an optimistic entry and return its temporary id.
    pub fn begin_send(&mut self, sender_id: Uuid, content: &str) -> Uuid {
        let message = Message::new(self.session_id, sender_id, content);
        let temp_id = message.id;
        self.entries.push(MessageEntry::Pending { key: message.dedup_key(), message });
        temp_id
    }

    /// Settle a successful send with the durable row the log returned.
    ///
    /// The broadcast confirmation may already have replaced the optimistic
    /// entry, in which case only the leftover entry is dropped.
    pub fn complete_send(&mut self, temp_id: Uuid, durable: Message) {
        let position = self.pending_position(temp_id);

        if self.durable_ids.contains(&durable.id) {
            if let Some(idx) = position {
                self.entries.remove(idx);
            }
            return;
        }

        self.durable_ids.insert(durable.id);
        match position {
            Some(idx) => self.entries[idx] = MessageEntry::Confirmed(durable),
            // A wholesale refresh dropped the optimistic entry before the append returned
            None => self.entries.push(MessageEntry::Confirmed(durable)),
        }
    }

    /// Drop an optimistic entry whose durable append failed.
    pub fn abort_send(&mut self, temp_id: Uuid) -> bool {
        match self.pending_position(temp_id) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Apply a broadcast change. Returns whether the view changed.
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        if event.session_id != self.session_id {
            return false;
        }

        match event.kind {
            ChangeKind::Insert => self.apply_insert(&event.new),
            ChangeKind::Update => self.apply_update(&event.new),
        }
    }

    /// Replace the whole view with a fresh read of the durable log.
    ///
    /// Unconfirmed entries are dropped; the log is authoritative.
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.durable_ids = messages.iter().map(|m| m.id).collect();
        self.entries = messages.into_iter().map(MessageEntry::Confirmed).collect();
    }

    fn apply_insert(&mut self, message: &Message) -> bool {
        if self.durable_ids.contains(&message.id) {
            return false;
        }
        self.durable_ids.insert(message.id);

        let key = message.dedup_key();
        let pending = self
            .entries
            .iter()
            .position(|e| matches!(e, MessageEntry::Pending { key: k, .. } if *k == key));

        match pending {
            Some(idx) => self.entries[idx] = MessageEntry::Confirmed(message.clone()),
            None => self.entries.push(MessageEntry::Confirmed(message.clone())),
        }
        true
    }

    fn apply_update(&mut self, message: &Message) -> bool {
        let existing = self
            .entries
            .iter_mut()
            .find(|e| matches!(e, MessageEntry::Confirmed(m) if m.id == message.id));

        match existing {
            Some(entry) => {
                *entry = MessageEntry::Confirmed(message.clone());
                true
            }
            None => false,
        }
    }

    fn pending_position(&self, temp_id: Uuid) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| matches!(e, MessageEntry::Pending { message, .. } if message.id == temp_id))
    }
}

/// How the stream currently learns about log changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Live,
    Polling,
}

/// Drives a [`MessageView`] from the broadcast channel, degrading to polling.
///
/// Owned and driven by a single task: call [`next_update`](Self::next_update)
/// in a loop and [`send`](Self::send) between updates.
pub struct MessageStream {
    viewer_id: Uuid,
    log: Arc<dyn MessageLog>,
    channel: Arc<dyn BroadcastChannel>,
    view: MessageView,
    subscription: Option<Subscription>,
    ticker: Option<Interval>,
    poll_interval: Duration,
}

impl MessageStream {
    /// Subscribe, then load the current log.
    ///
    /// Subscribing first means nothing committed between the two steps is
    /// missed. A failed subscribe starts the stream in polling mode.
    pub async fn connect(
        session_id: Uuid,
        viewer_id: Uuid,
        log: Arc<dyn MessageLog>,
        channel: Arc<dyn BroadcastChannel>,
        poll_interval: Duration,
    ) -> DomainResult<Self> {
        let mut stream = Self {
            viewer_id,
            log,
            channel,
            view: MessageView::new(session_id),
            subscription: None,
            ticker: None,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        };

        match stream.channel.subscribe(session_id).await {
            Ok(subscription) => stream.subscription = Some(subscription),
            Err(e) => {
                warn!(%session_id, error = %e, "subscribe failed, starting in polling mode");
                stream.enter_polling();
            }
        }

        stream.refresh().await?;
        Ok(stream)
    }

    pub fn view(&self) -> &MessageView {
        &self.view
    }

    pub fn mode(&self) -> StreamMode {
        if self.subscription.is_some() {
            StreamMode::Live
        } else {
            StreamMode::Polling
        }
    }

    /// Send a message: render it optimistically, append it durably, settle it.
    ///
    /// On failure the optimistic entry is removed and the error returned.
    pub async fn send(&mut self, content: &str) -> DomainResult<Message> {
        let session_id = self.view.session_id();
        let temp_id = self.view.begin_send(self.viewer_id, content);

        match self.log.append(session_id, self.viewer_id, content).await {
            Ok(message) => {
                self.view.complete_send(temp_id, message.clone());
                Ok(message)
            }
            Err(e) => {
                self.view.abort_send(temp_id);
                warn!(%session_id, error = %e, "send failed, optimistic entry removed");
                Err(e)
            }
        }
    }

    /// Full re-fetch of the durable log, replacing the view wholesale.
    pub async fn refresh(&mut self) -> DomainResult<()> {
        let messages = self.log.fetch(self.view.session_id(), self.viewer_id).await?;
        self.view.replace_all(messages);
        Ok(())
    }

    /// Wait for and apply the next change. Returns whether the view changed.
    ///
    /// In live mode this waits on the subscription; a lag triggers one full
    /// re-fetch and a closed stream switches to polling. In polling mode this
    /// waits for the next tick, tries to resubscribe, then re-fetches.
    pub async fn next_update(&mut self) -> DomainResult<bool> {
        let session_id = self.view.session_id();

        if let Some(subscription) = self.subscription.as_mut() {
            return match subscription.next().await {
                Some(Delivery::Change(event)) => Ok(self.view.apply(&event)),
                Some(Delivery::Lagged(missed)) => {
                    warn!(%session_id, missed, "subscriber lagged, re-fetching");
                    self.refresh().await?;
                    Ok(true)
                }
                None => {
                    warn!(%session_id, "broadcast stream closed, falling back to polling");
                    self.subscription = None;
                    self.enter_polling();
                    Ok(false)
                }
            };
        }

        let ticker = self.ticker.get_or_insert_with(|| new_ticker(self.poll_interval));
        ticker.tick().await;

        if let Ok(subscription) = self.channel.subscribe(session_id).await {
            info!(%session_id, "resubscribed, leaving polling mode");
            self.subscription = Some(subscription);
            self.ticker = None;
        } else {
            debug!(%session_id, "broadcast still unavailable");
        }

        self.refresh().await?;
        Ok(true)
    }

    fn enter_polling(&mut self) {
        self.ticker = Some(new_ticker(self.poll_interval));
    }
}

fn new_ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
