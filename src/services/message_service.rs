//! Server side of session messaging: owns the durable log and publishes
//! its changes on the broadcast channel.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::notify_best_effort;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ChangeEvent, Message, MessagingConfig, Notification, NotificationKind, Session, SessionStatus};
use crate::domain::ports::{BroadcastChannel, MessageLog, MessageRepository, NotificationSink, SessionRepository};

pub struct MessageService {
    sessions: Arc<dyn SessionRepository>,
    messages: Arc<dyn MessageRepository>,
    broadcast: Arc<dyn BroadcastChannel>,
    notifier: Arc<dyn NotificationSink>,
    config: MessagingConfig,
}

impl MessageService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        messages: Arc<dyn MessageRepository>,
        broadcast: Arc<dyn BroadcastChannel>,
        notifier: Arc<dyn NotificationSink>,
        config: MessagingConfig,
    ) -> Self {
        Self { sessions, messages, broadcast, notifier, config }
    }

    /// Append a message to an active session's log.
    #[instrument(skip(self, content), err)]
    pub async fn post(&self, session_id: Uuid, sender_id: Uuid, content: &str) -> DomainResult<Message> {
        let session = self.participant_session(session_id, sender_id).await?;
        if session.status != SessionStatus::Active {
            return Err(DomainError::SessionNotActive(session_id));
        }
        self.validate_content(content)?;

        let message = Message::new(session_id, sender_id, content);
        self.messages.append(&message).await?;
        info!(%session_id, message_id = %message.id, "message appended");

        // Subscribers that miss this converge through polling
        if let Err(e) = self.broadcast.publish(ChangeEvent::insert(message.clone())).await {
            warn!(%session_id, error = %e, "failed to publish message insert");
        }

        if let Some(counterpart) = session.counterpart_of(sender_id) {
            notify_best_effort(
                self.notifier.as_ref(),
                Notification::new(
                    NotificationKind::NewMessage,
                    counterpart,
                    json!({ "session_id": session_id, "message_id": message.id, "sender_id": sender_id }),
                ),
            )
            .await;
        }

        Ok(message)
    }

    /// The session's log in insertion order.
    pub async fn list(&self, session_id: Uuid, caller_id: Uuid) -> DomainResult<Vec<Message>> {
        self.participant_session(session_id, caller_id).await?;
        self.messages.list_for_session(session_id).await
    }

    /// Flag a message read. Only the participant who did not send it may do so.
    #[instrument(skip(self), err)]
    pub async fn mark_read(&self, message_id: Uuid, caller_id: Uuid) -> DomainResult<Message> {
        let message = self
            .messages
            .get(message_id)
            .await?
            .ok_or(DomainError::MessageNotFound(message_id))?;
        self.participant_session(message.session_id, caller_id).await?;

        if message.sender_id == caller_id {
            return Err(DomainError::Forbidden("the sender cannot mark their own message read".to_string()));
        }
        if message.is_read {
            return Ok(message);
        }

        if !self.messages.mark_read(message_id).await? {
            return Err(DomainError::MessageNotFound(message_id));
        }

        let updated = Message { is_read: true, ..message.clone() };
        if let Err(e) = self.broadcast.publish(ChangeEvent::update(message, updated.clone())).await {
            warn!(%message_id, error = %e, "failed to publish message update");
        }
        Ok(updated)
    }

    async fn participant_session(&self, session_id: Uuid, user_id: Uuid) -> DomainResult<Session> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(DomainError::SessionNotFound(session_id))?;
        if !session.is_participant(user_id) {
            return Err(DomainError::Forbidden("caller is not a participant of this session".to_string()));
        }
        Ok(session)
    }

    fn validate_content(&self, content: &str) -> DomainResult<()> {
        if content.trim().is_empty() {
            return Err(DomainError::ValidationFailed("Message content cannot be empty".to_string()));
        }
        let len = content.chars().count();
        if len > self.config.max_content_len {
            return Err(DomainError::ValidationFailed(format!(
                "Message content is {len} characters, the maximum is {}",
                self.config.max_content_len
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageLog for MessageService {
    async fn append(&self, session_id: Uuid, sender_id: Uuid, content: &str) -> DomainResult<Message> {
        self.post(session_id, sender_id, content).await
    }

    async fn fetch(&self, session_id: Uuid, viewer_id: Uuid) -> DomainResult<Vec<Message>> {
        self.list(session_id, viewer_id).await
    }
}
