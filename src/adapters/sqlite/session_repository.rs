//! SQLite implementation of the SessionRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Session, SessionStatus};
use crate::domain::ports::SessionRepository;

const SESSION_COLUMNS: &str =
    "id, initiator_id, recipient_id, amount, status, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn create(&self, session: &Session) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO sessions (id, initiator_id, recipient_id, amount, status, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#
        )
        .bind(session.id.to_string())
        .bind(session.initiator_id.to_string())
        .bind(session.recipient_id.to_string())
        .bind(session.amount)
        .bind(session.status.as_str())
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_into()).transpose()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: SessionStatus,
        to: SessionStatus,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<bool> {
        if !from.can_transition_to(to) {
            return Err(DomainError::InvalidStateTransition { from, to });
        }

        let result = sqlx::query(
            "UPDATE sessions SET status = ?, updated_at = ? WHERE id = ? AND status = ?"
        )
        .bind(to.as_str())
        .bind(updated_at.to_rfc3339())
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> DomainResult<Vec<Session>> {
        // RFC3339 text does not sort reliably across precisions; filter in code
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE status = 'pending'"
        ))
        .fetch_all(&self.pool)
        .await?;

        let sessions = rows.into_iter().map(Session::try_from).collect::<DomainResult<Vec<_>>>()?;
        Ok(sessions.into_iter().filter(|s| s.created_at < cutoff).collect())
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    initiator_id: String,
    recipient_id: String,
    amount: i64,
    status: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SessionRow> for Session {
    type Error = DomainError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let status = SessionStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {}", row.status)))?;

        Ok(Session {
            id: parse_uuid(&row.id)?,
            initiator_id: parse_uuid(&row.initiator_id)?,
            recipient_id: parse_uuid(&row.recipient_id)?,
            amount: row.amount,
            status,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}
