//! SQLite implementation of the SummonRepository.
//!
//! The ledger is stored as an aggregate row (`summons`) plus append-only
//! entry rows (`summon_backers`). An append writes both inside one
//! transaction, guarded by the aggregate's version column.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_datetime, parse_uuid};
use crate::domain::errors::{is_busy, is_unique_violation, DomainError, DomainResult};
use crate::domain::models::{BackerEntry, BackerStats, Summon, SummonTarget};
use crate::domain::ports::SummonRepository;

#[derive(Clone)]
pub struct SqliteSummonRepository {
    pool: SqlitePool,
}

impl SqliteSummonRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn conflict(summon_id: Uuid) -> DomainError {
        DomainError::ConcurrencyConflict {
            entity: "summon".to_string(),
            id: summon_id.to_string(),
        }
    }

    fn map_write_error(err: sqlx::Error, summon_id: Uuid) -> DomainError {
        if is_busy(&err) {
            Self::conflict(summon_id)
        } else {
            err.into()
        }
    }
}

#[async_trait]
impl SummonRepository for SqliteSummonRepository {
    async fn create(&self, summon: &Summon) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO summons (id, creator_id, target_name, target_handle, total_pledged,
               backer_count, version, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        )
        .bind(summon.id.to_string())
        .bind(summon.creator_id.to_string())
        .bind(&summon.target.name)
        .bind(&summon.target.handle)
        .bind(summon.total_pledged)
        .bind(summon.backer_count)
        .bind(summon.version as i64)
        .bind(summon.created_at.to_rfc3339())
        .bind(summon.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Summon>> {
        let row: Option<SummonRow> = sqlx::query_as(
            r#"SELECT id, creator_id, target_name, target_handle, total_pledged, backer_count,
               version, created_at, updated_at
               FROM summons WHERE id = ?"#
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let entries: Vec<BackerRow> = sqlx::query_as(
            "SELECT backer_id, amount, backed_at FROM summon_backers WHERE summon_id = ? ORDER BY seq"
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let entries = entries
            .into_iter()
            .map(BackerEntry::try_from)
            .collect::<DomainResult<Vec<_>>>()?;

        Ok(Some(row.into_summon(entries)?))
    }

    async fn append_entry(
        &self,
        summon_id: Uuid,
        entry: &BackerEntry,
        expected_version: u64,
    ) -> DomainResult<Summon> {
        let map_err = |e| Self::map_write_error(e, summon_id);
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let current: Option<(i64, i64)> = sqlx::query_as("SELECT version, total_pledged FROM summons WHERE id = ?")
            .bind(summon_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_err)?;

        let Some((version, total_pledged)) = current else {
            tx.rollback().await?;
            return Err(DomainError::SummonNotFound(summon_id));
        };

        if version as u64 != expected_version {
            tx.rollback().await?;
            return Err(Self::conflict(summon_id));
        }

        // SQLite would silently widen an overflowing sum to REAL
        if total_pledged.checked_add(entry.amount).is_none() {
            tx.rollback().await?;
            return Err(DomainError::ValidationFailed(format!(
                "Pledge of {} would overflow the total of summon {summon_id}",
                entry.amount
            )));
        }

        let inserted = sqlx::query(
            "INSERT INTO summon_backers (summon_id, backer_id, amount, backed_at) VALUES (?, ?, ?, ?)"
        )
        .bind(summon_id.to_string())
        .bind(entry.backer_id.to_string())
        .bind(entry.amount)
        .bind(entry.backed_at.to_rfc3339())
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            tx.rollback().await?;
            if is_unique_violation(&e) {
                return Err(DomainError::AlreadyBacked { summon_id, backer_id: entry.backer_id });
            }
            return Err(map_err(e));
        }

        let updated = sqlx::query(
            r#"UPDATE summons SET total_pledged = total_pledged + ?, backer_count = backer_count + 1,
               version = version + 1, updated_at = ?
               WHERE id = ? AND version = ?"#
        )
        .bind(entry.amount)
        .bind(entry.backed_at.to_rfc3339())
        .bind(summon_id.to_string())
        .bind(version)
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(Self::conflict(summon_id));
        }

        tx.commit().await.map_err(map_err)?;

        self.get(summon_id)
            .await?
            .ok_or(DomainError::SummonNotFound(summon_id))
    }

    /// Lifetime totals saturate at `i64::MAX`.
    async fn increment_backer_stats(&self, backer_id: Uuid, amount: i64) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO backer_stats (backer_id, pledge_count, total_pledged, updated_at)
               VALUES (?, 1, ?, ?)
               ON CONFLICT (backer_id) DO UPDATE SET
                   pledge_count = pledge_count + 1,
                   total_pledged = CASE
                       WHEN total_pledged > 9223372036854775807 - excluded.total_pledged THEN 9223372036854775807
                       ELSE total_pledged + excluded.total_pledged
                   END,
                   updated_at = excluded.updated_at"#
        )
        .bind(backer_id.to_string())
        .bind(amount)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn backer_stats(&self, backer_id: Uuid) -> DomainResult<BackerStats> {
        let row: Option<(i64, i64)> = sqlx::query_as(
            "SELECT pledge_count, total_pledged FROM backer_stats WHERE backer_id = ?"
        )
        .bind(backer_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let (pledge_count, total_pledged) = row.unwrap_or((0, 0));
        Ok(BackerStats { backer_id, pledge_count, total_pledged })
    }

    async fn recompute_backer_stats(&self, backer_id: Uuid) -> DomainResult<BackerStats> {
        let (pledge_count, total_pledged): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(amount), 0) FROM summon_backers WHERE backer_id = ?"
        )
        .bind(backer_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        sqlx::query(
            r#"INSERT INTO backer_stats (backer_id, pledge_count, total_pledged, updated_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT (backer_id) DO UPDATE SET
                   pledge_count = excluded.pledge_count,
                   total_pledged = excluded.total_pledged,
                   updated_at = excluded.updated_at"#
        )
        .bind(backer_id.to_string())
        .bind(pledge_count)
        .bind(total_pledged)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(BackerStats { backer_id, pledge_count, total_pledged })
    }
}

#[derive(sqlx::FromRow)]
struct SummonRow {
    id: String,
    creator_id: String,
    target_name: String,
    target_handle: Option<String>,
    total_pledged: i64,
    backer_count: i64,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl SummonRow {
    fn into_summon(self, entries: Vec<BackerEntry>) -> DomainResult<Summon> {
        Ok(Summon {
            id: parse_uuid(&self.id)?,
            creator_id: parse_uuid(&self.creator_id)?,
            target: SummonTarget {
                name: self.target_name,
                handle: self.target_handle,
            },
            entries,
            total_pledged: self.total_pledged,
            backer_count: self.backer_count,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            version: self.version as u64,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BackerRow {
    backer_id: String,
    amount: i64,
    backed_at: String,
}

impl TryFrom<BackerRow> for BackerEntry {
    type Error = DomainError;

    fn try_from(row: BackerRow) -> Result<Self, Self::Error> {
        Ok(BackerEntry {
            backer_id: parse_uuid(&row.backer_id)?,
            amount: row.amount,
            backed_at: parse_datetime(&row.backed_at)?,
        })
    }
}
