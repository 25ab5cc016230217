//! Opening the Parley store.
//!
//! Every pool runs with foreign keys on; file-backed pools also use WAL so
//! readers never block the single writer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::domain::models::DatabaseConfig;

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a caller waits for a free pooled connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to open database: {0}")]
    Open(#[source] sqlx::Error),
    #[error("Database did not answer: {0}")]
    Ping(#[source] sqlx::Error),
}

/// Open the configured database file, creating it and its directory when missing.
pub async fn open(config: &DatabaseConfig) -> Result<SqlitePool, ConnectionError> {
    let path = Path::new(config.path.strip_prefix("sqlite:").unwrap_or(&config.path));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ConnectionError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .min_connections(1)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await
        .map_err(ConnectionError::Open)?;

    tracing::debug!(path = %path.display(), max_connections = config.max_connections, "database pool opened");
    Ok(pool)
}

/// A private in-memory database.
///
/// Limited to one connection: every `:memory:` connection is its own database.
pub async fn open_in_memory() -> Result<SqlitePool, ConnectionError> {
    let options = SqliteConnectOptions::new()
        .in_memory(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(ConnectionError::Open)
}

/// Round-trip a trivial query.
pub async fn ping(pool: &SqlitePool) -> Result<(), ConnectionError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(ConnectionError::Ping)
}
