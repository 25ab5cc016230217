//! SQLite implementations of the store ports.
//!
//! Ids are stored as UUID text, timestamps as RFC 3339 text and amounts as
//! integer minor units.

pub mod connection;
pub mod escrow_repository;
pub mod message_repository;
pub mod migrations;
pub mod notification_repository;
pub mod session_repository;
pub mod summon_repository;
pub mod wallet_repository;

pub use connection::{open, open_in_memory, ping, ConnectionError};
pub use escrow_repository::SqliteEscrowRepository;
pub use message_repository::SqliteMessageRepository;
pub use migrations::{Migration, MigrationError, Migrator, MIGRATIONS};
pub use notification_repository::SqliteNotificationSink;
pub use session_repository::SqliteSessionRepository;
pub use summon_repository::SqliteSummonRepository;
pub use wallet_repository::SqliteWalletRepository;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::DatabaseConfig;

fn malformed(kind: &str, value: &str, err: impl std::fmt::Display) -> DomainError {
    DomainError::SerializationError(format!("stored {kind} {value:?} is malformed: {err}"))
}

pub fn parse_uuid(s: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| malformed("id", s, e))
}

pub fn parse_optional_uuid(s: Option<String>) -> DomainResult<Option<Uuid>> {
    s.as_deref().map(parse_uuid).transpose()
}

/// Timestamps are written with `to_rfc3339()` and read back as UTC.
pub fn parse_datetime(s: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| malformed("timestamp", s, e))
}

pub fn parse_optional_datetime(s: Option<String>) -> DomainResult<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_datetime).transpose()
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
}

/// Open the configured database and bring its schema up to date.
pub async fn initialize_from_config(config: &DatabaseConfig) -> Result<SqlitePool, DatabaseError> {
    let pool = open(config).await?;
    Migrator::new(pool.clone()).migrate().await?;
    Ok(pool)
}

/// A private in-memory store with the full schema, for tests and ephemeral runs.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = open_in_memory().await?;
    Migrator::new(pool.clone()).migrate().await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_helpers_reject_malformed_values() {
        assert!(matches!(parse_uuid("nope"), Err(DomainError::SerializationError(_))));
        assert!(matches!(parse_datetime("yesterday"), Err(DomainError::SerializationError(_))));
        assert_eq!(parse_optional_uuid(None).unwrap(), None);

        let at = parse_datetime("2026-01-02T03:04:05+02:00").unwrap();
        assert_eq!(at.to_rfc3339(), "2026-01-02T01:04:05+00:00");
    }
}
