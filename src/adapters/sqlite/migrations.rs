//! Versioned schema migrations embedded in the binary.
//!
//! Applied versions are recorded in `schema_migrations`; each migration runs
//! in its own transaction together with its bookkeeping row.

use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to read or record schema version: {0}")]
    Bookkeeping(#[source] sqlx::Error),
    #[error("Migration {version} ({description}) failed: {source}")]
    Apply {
        version: i64,
        description: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

/// Every schema migration, in version order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "sessions, escrow mirror, wallets, messages and notifications",
        sql: include_str!("../../../migrations/001_initial_schema.sql"),
    },
    Migration {
        version: 2,
        description: "summon pledge ledger and backer stats",
        sql: include_str!("../../../migrations/002_summon_ledger.sql"),
    },
];

pub struct Migrator {
    pool: SqlitePool,
}

impl Migrator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Version the embedded migrations bring a database to.
    pub fn latest_version() -> i64 {
        MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0)
    }

    /// Apply every embedded migration not yet recorded. Returns how many ran.
    pub async fn migrate(&self) -> Result<usize, MigrationError> {
        self.apply(MIGRATIONS).await
    }

    /// Apply the given migrations above the current version, in order.
    pub async fn apply(&self, migrations: &[Migration]) -> Result<usize, MigrationError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(MigrationError::Bookkeeping)?;

        let current = self.current_version().await?;
        let mut applied = 0;
        for migration in migrations.iter().filter(|m| m.version > current) {
            self.apply_one(migration).await?;
            applied += 1;
        }
        Ok(applied)
    }

    pub async fn current_version(&self) -> Result<i64, MigrationError> {
        let (version,): (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_one(&self.pool)
            .await
            .map_err(MigrationError::Bookkeeping)?;
        Ok(version)
    }

    async fn apply_one(&self, migration: &Migration) -> Result<(), MigrationError> {
        let failed = |source| MigrationError::Apply {
            version: migration.version,
            description: migration.description,
            source,
        };

        let mut tx = self.pool.begin().await.map_err(failed)?;
        sqlx::raw_sql(migration.sql).execute(&mut *tx).await.map_err(failed)?;
        sqlx::query("INSERT INTO schema_migrations (version, description) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.description)
            .execute(&mut *tx)
            .await
            .map_err(failed)?;
        tx.commit().await.map_err(failed)?;

        tracing::info!(version = migration.version, description = migration.description, "migration applied");
        Ok(())
    }
}
