//! SQLite implementation of the MessageRepository (durable message log).

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Message;
use crate::domain::ports::MessageRepository;

#[derive(Clone)]
pub struct SqliteMessageRepository {
    pool: SqlitePool,
}

impl SqliteMessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for SqliteMessageRepository {
    async fn append(&self, message: &Message) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO messages (id, session_id, sender_id, content, is_read, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#
        )
        .bind(message.id.to_string())
        .bind(message.session_id.to_string())
        .bind(message.sender_id.to_string())
        .bind(&message.content)
        .bind(message.is_read)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(
            "SELECT id, session_id, sender_id, content, is_read, created_at FROM messages WHERE id = ?"
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_into()).transpose()
    }

    async fn list_for_session(&self, session_id: Uuid) -> DomainResult<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"SELECT id, session_id, sender_id, content, is_read, created_at
               FROM messages WHERE session_id = ? ORDER BY seq ASC"#
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn mark_read(&self, id: Uuid) -> DomainResult<bool> {
        let result = sqlx::query("UPDATE messages SET is_read = 1 WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    session_id: String,
    sender_id: String,
    content: String,
    is_read: bool,
    created_at: String,
}

impl TryFrom<MessageRow> for Message {
    type Error = DomainError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: parse_uuid(&row.id)?,
            session_id: parse_uuid(&row.session_id)?,
            sender_id: parse_uuid(&row.sender_id)?,
            content: row.content,
            is_read: row.is_read,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteSessionRepository};
    use crate::domain::models::Session;
    use crate::domain::ports::SessionRepository;

    async fn setup() -> (SqliteMessageRepository, Session) {
        let pool = create_migrated_test_pool().await.unwrap();
        let session = Session::new(Uuid::new_v4(), Uuid::new_v4(), 10);
        SqliteSessionRepository::new(pool.clone()).create(&session).await.unwrap();
        (SqliteMessageRepository::new(pool), session)
    }

    #[tokio::test]
    async fn test_log_preserves_insertion_order() {
        let (repo, session) = setup().await;
        let first = Message::new(session.id, session.initiator_id, "first");
        let mut second = Message::new(session.id, session.recipient_id, "second");
        // An earlier timestamp must not reorder the log
        second.created_at = first.created_at - chrono::Duration::seconds(30);

        repo.append(&first).await.unwrap();
        repo.append(&second).await.unwrap();

        let log = repo.list_for_session(session.id).await.unwrap();
        let contents: Vec<&str> = log.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_mark_read() {
        let (repo, session) = setup().await;
        let message = Message::new(session.id, session.initiator_id, "ping");
        repo.append(&message).await.unwrap();

        assert!(repo.mark_read(message.id).await.unwrap());
        assert!(repo.get(message.id).await.unwrap().unwrap().is_read);
        assert!(!repo.mark_read(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_append_requires_existing_session() {
        let (repo, _) = setup().await;
        let orphan = Message::new(Uuid::new_v4(), Uuid::new_v4(), "lost");
        assert!(repo.append(&orphan).await.is_err());
    }
}
