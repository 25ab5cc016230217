//! Loading and validating [`Config`](crate::domain::models::Config).
//!
//! Layers merge in order: defaults, `.parley/config.yaml`, `.parley/local.yaml`,
//! then `PARLEY_*` environment variables.

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
