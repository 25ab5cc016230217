use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// A loaded configuration that would misbehave at runtime.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("server.host is empty")]
    EmptyHost,

    #[error("Unknown log level {0:?}; expected trace, debug, info, warn or error")]
    InvalidLogLevel(String),

    #[error("database.path is empty")]
    EmptyDatabasePath,

    #[error("database.max_connections is {0}; the pool needs at least one connection")]
    InvalidMaxConnections(u32),

    #[error("escrow.match_window_secs is {0}; the window cannot be negative")]
    InvalidMatchWindow(i64),

    #[error("{field} is {value}; it must be at least 1")]
    NonPositive { field: &'static str, value: i64 },

    #[error("pledge.max_cas_attempts is {0}; a pledge needs at least one attempt")]
    InvalidCasAttempts(u32),
}

/// Figment-backed loader for [`Config`].
pub struct ConfigLoader;

impl ConfigLoader {
    /// Project configuration directory, relative to the working directory.
    pub const CONFIG_DIR: &'static str = ".parley";

    /// Environment variable prefix; `__` separates nested keys.
    pub const ENV_PREFIX: &'static str = "PARLEY_";

    /// Load from [`CONFIG_DIR`](Self::CONFIG_DIR).
    ///
    /// Later layers win: defaults, `config.yaml`, `local.yaml`, then
    /// `PARLEY_*` variables (e.g. `PARLEY_ESCROW__MATCH_WINDOW_SECS=120`).
    /// Missing files are skipped.
    pub fn load() -> Result<Config> {
        Self::load_from_dir(Self::CONFIG_DIR)
    }

    /// Same as [`load`](Self::load) with the configuration directory given explicitly.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let dir = dir.as_ref();
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Invalid configuration under {}", dir.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
            .extract()
            .context(format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Reject values the services cannot run with.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.server.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.iter().any(|l| l.eq_ignore_ascii_case(&config.logging.level)) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        if config.escrow.match_window_secs < 0 {
            return Err(ConfigError::InvalidMatchWindow(config.escrow.match_window_secs));
        }

        let positive: [(&'static str, i64); 7] = [
            ("session.min_amount", config.session.min_amount),
            ("session.pending_ttl_hours", config.session.pending_ttl_hours),
            ("session.sweep_interval_secs", saturating_i64(config.session.sweep_interval_secs)),
            ("pledge.min_amount", config.pledge.min_amount),
            ("messaging.poll_interval_ms", saturating_i64(config.messaging.poll_interval_ms)),
            ("messaging.broadcast_capacity", saturating_i64(config.messaging.broadcast_capacity as u64)),
            ("messaging.max_content_len", saturating_i64(config.messaging.max_content_len as u64)),
        ];
        if let Some((field, value)) = positive.into_iter().find(|(_, value)| *value < 1) {
            return Err(ConfigError::NonPositive { field, value });
        }

        if config.pledge.max_cas_attempts == 0 {
            return Err(ConfigError::InvalidCasAttempts(config.pledge.max_cas_attempts));
        }

        Ok(())
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
