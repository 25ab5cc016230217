//! SQLite implementation of the EscrowRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_datetime, parse_optional_datetime, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{is_unique_violation, DomainError, DomainResult};
use crate::domain::models::{normalize_address, EscrowRecord, EscrowStatus};
use crate::domain::ports::{EscrowRepository, LinkOutcome};

const ESCROW_COLUMNS: &str = "id, external_id, depositor_address, recipient_address, amount, status, \
     session_id, accept_deadline, dispute_deadline, created_at";

#[derive(Clone)]
pub struct SqliteEscrowRepository {
    pool: SqlitePool,
}

impl SqliteEscrowRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EscrowRepository for SqliteEscrowRepository {
    async fn create(&self, record: &EscrowRecord) -> DomainResult<()> {
        let result = sqlx::query(
            r#"INSERT INTO escrow_records (id, external_id, depositor_address, recipient_address, amount,
               status, session_id, accept_deadline, dispute_deadline, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        )
        .bind(record.id.to_string())
        .bind(&record.external_id)
        .bind(normalize_address(&record.depositor_address))
        .bind(normalize_address(&record.recipient_address))
        .bind(record.amount)
        .bind(record.status.as_str())
        .bind(record.session_id.map(|id| id.to_string()))
        .bind(record.accept_deadline.map(|dt| dt.to_rfc3339()))
        .bind(record.dispute_deadline.map(|dt| dt.to_rfc3339()))
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(DomainError::ValidationFailed(format!(
                "Escrow record {} already exists or its session is already linked",
                record.external_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<EscrowRecord>> {
        let row: Option<EscrowRow> = sqlx::query_as(&format!(
            "SELECT {ESCROW_COLUMNS} FROM escrow_records WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_into()).transpose()
    }

    async fn get_by_external_id(&self, external_id: &str) -> DomainResult<Option<EscrowRecord>> {
        let row: Option<EscrowRow> = sqlx::query_as(&format!(
            "SELECT {ESCROW_COLUMNS} FROM escrow_records WHERE external_id = ?"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_into()).transpose()
    }

    async fn find_by_session(&self, session_id: Uuid) -> DomainResult<Vec<EscrowRecord>> {
        let rows: Vec<EscrowRow> = sqlx::query_as(&format!(
            "SELECT {ESCROW_COLUMNS} FROM escrow_records WHERE session_id = ?"
        ))
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn find_unlinked(
        &self,
        recipient_address: &str,
        amount: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DomainResult<Vec<EscrowRecord>> {
        let rows: Vec<EscrowRow> = sqlx::query_as(&format!(
            "SELECT {ESCROW_COLUMNS} FROM escrow_records
             WHERE recipient_address = ? AND amount = ? AND session_id IS NULL"
        ))
        .bind(normalize_address(recipient_address))
        .bind(amount)
        .fetch_all(&self.pool)
        .await?;

        // Time range is applied in code: stored RFC3339 text is not reliably ordered
        let mut records: Vec<EscrowRecord> = rows
            .into_iter()
            .map(EscrowRecord::try_from)
            .collect::<DomainResult<Vec<_>>>()?
            .into_iter()
            .filter(|r| r.created_at >= from && r.created_at <= to)
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn try_link(&self, escrow_id: Uuid, session_id: Uuid) -> DomainResult<LinkOutcome> {
        let result = sqlx::query(
            "UPDATE escrow_records SET session_id = ? WHERE id = ? AND session_id IS NULL"
        )
        .bind(session_id.to_string())
        .bind(escrow_id.to_string())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => Ok(LinkOutcome::Linked),
            Ok(_) => {
                let current: Option<(Option<String>,)> =
                    sqlx::query_as("SELECT session_id FROM escrow_records WHERE id = ?")
                        .bind(escrow_id.to_string())
                        .fetch_optional(&self.pool)
                        .await?;

                let Some((linked,)) = current else {
                    return Err(DomainError::EscrowNotFound(escrow_id));
                };
                if parse_optional_uuid(linked)? == Some(session_id) {
                    Ok(LinkOutcome::AlreadyLinkedToSession)
                } else {
                    Ok(LinkOutcome::Conflict)
                }
            }
            // The session already owns another escrow record
            Err(e) if is_unique_violation(&e) => Ok(LinkOutcome::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_status(&self, escrow_id: Uuid, status: EscrowStatus) -> DomainResult<()> {
        let result = sqlx::query("UPDATE escrow_records SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(escrow_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::EscrowNotFound(escrow_id));
        }

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct EscrowRow {
    id: String,
    external_id: String,
    depositor_address: String,
    recipient_address: String,
    amount: i64,
    status: String,
    session_id: Option<String>,
    accept_deadline: Option<String>,
    dispute_deadline: Option<String>,
    created_at: String,
}

impl TryFrom<EscrowRow> for EscrowRecord {
    type Error = DomainError;

    fn try_from(row: EscrowRow) -> Result<Self, Self::Error> {
        let status = EscrowStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid escrow status: {}", row.status)))?;

        Ok(EscrowRecord {
            id: parse_uuid(&row.id)?,
            external_id: row.external_id,
            depositor_address: row.depositor_address,
            recipient_address: row.recipient_address,
            amount: row.amount,
            status,
            session_id: parse_optional_uuid(row.session_id)?,
            accept_deadline: parse_optional_datetime(row.accept_deadline)?,
            dispute_deadline: parse_optional_datetime(row.dispute_deadline)?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}
