//! SQLite notification outbox.
//!
//! Implements the NotificationSink port by persisting notifications; the
//! delivery transport reads the outbox and is not part of this service.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Notification, NotificationKind};
use crate::domain::ports::NotificationSink;

#[derive(Clone)]
pub struct SqliteNotificationSink {
    pool: SqlitePool,
}

impl SqliteNotificationSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Notifications addressed to a user, oldest first.
    pub async fn list_for_user(&self, user_id: Uuid) -> DomainResult<Vec<Notification>> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            r#"SELECT id, kind, target_user, payload, created_at FROM notifications
               WHERE target_user = ? ORDER BY rowid ASC"#
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }
}

#[async_trait]
impl NotificationSink for SqliteNotificationSink {
    async fn notify(&self, notification: Notification) -> DomainResult<()> {
        let payload = serde_json::to_string(&notification.payload)?;

        sqlx::query(
            r#"INSERT INTO notifications (id, kind, target_user, payload, created_at)
               VALUES (?, ?, ?, ?, ?)"#
        )
        .bind(notification.id.to_string())
        .bind(notification.kind.as_str())
        .bind(notification.target_user.to_string())
        .bind(&payload)
        .bind(notification.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            kind = notification.kind.as_str(),
            target_user = %notification.target_user,
            "notification queued"
        );
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    kind: String,
    target_user: String,
    payload: String,
    created_at: String,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = DomainError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let kind = NotificationKind::from_str(&row.kind)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid notification kind: {}", row.kind)))?;

        Ok(Notification {
            id: parse_uuid(&row.id)?,
            kind,
            target_user: parse_uuid(&row.target_user)?,
            payload: serde_json::from_str(&row.payload)?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use serde_json::json;

    #[tokio::test]
    async fn test_notify_persists_to_outbox() {
        let pool = create_migrated_test_pool().await.unwrap();
        let sink = SqliteNotificationSink::new(pool);
        let user = Uuid::new_v4();

        sink.notify(Notification::new(NotificationKind::SessionAccepted, user, json!({"session_id": "s"})))
            .await
            .unwrap();

        let queued = sink.list_for_user(user).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].kind, NotificationKind::SessionAccepted);
        assert_eq!(queued[0].payload["session_id"], "s");
    }
}
