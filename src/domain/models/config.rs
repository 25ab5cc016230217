use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Main configuration structure for Parley
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Escrow matching configuration
    #[serde(default)]
    pub escrow: EscrowConfig,

    /// Session lifecycle configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Pledge ledger configuration
    #[serde(default)]
    pub pledge: PledgeConfig,

    /// Messaging configuration
    #[serde(default)]
    pub messaging: MessagingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8080
}

const fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enable_cors: default_true(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".parley/parley.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Log file rotation policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    Daily,
    Hourly,
    Never,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Directory for log files (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Log rotation policy for file output
    #[serde(default = "default_rotation")]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

const fn default_rotation() -> RotationPolicy {
    RotationPolicy::Daily
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Escrow matching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EscrowConfig {
    /// Half-width of the legacy deposit matching window, in seconds
    #[serde(default = "default_match_window_secs")]
    pub match_window_secs: i64,

    /// Caller identities allowed to ingest escrow records (the chain watchers)
    #[serde(default)]
    pub watcher_ids: Vec<Uuid>,
}

const fn default_match_window_secs() -> i64 {
    300
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            match_window_secs: default_match_window_secs(),
            watcher_ids: Vec::new(),
        }
    }
}

/// Session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Minimum session price in minor units
    #[serde(default = "default_min_amount")]
    pub min_amount: i64,

    /// Pending sessions older than this are expired by the sweeper
    #[serde(default = "default_pending_ttl_hours")]
    pub pending_ttl_hours: i64,

    /// How often the expiry sweeper runs, in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

const fn default_min_amount() -> i64 {
    1
}

const fn default_pending_ttl_hours() -> i64 {
    72
}

const fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_amount: default_min_amount(),
            pending_ttl_hours: default_pending_ttl_hours(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Pledge ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PledgeConfig {
    /// Minimum pledge in minor units
    #[serde(default = "default_min_amount")]
    pub min_amount: i64,

    /// Attempts before a version conflict is surfaced to the caller
    #[serde(default = "default_max_cas_attempts")]
    pub max_cas_attempts: u32,
}

const fn default_max_cas_attempts() -> u32 {
    5
}

impl Default for PledgeConfig {
    fn default() -> Self {
        Self {
            min_amount: default_min_amount(),
            max_cas_attempts: default_max_cas_attempts(),
        }
    }
}

/// Messaging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MessagingConfig {
    /// Degraded-mode re-fetch interval, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Per-session broadcast buffer size
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    /// Maximum message length in characters
    #[serde(default = "default_max_content_len")]
    pub max_content_len: usize,
}

const fn default_poll_interval_ms() -> u64 {
    3000
}

const fn default_broadcast_capacity() -> usize {
    256
}

const fn default_max_content_len() -> usize {
    4000
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            broadcast_capacity: default_broadcast_capacity(),
            max_content_len: default_max_content_len(),
        }
    }
}
