//! Domain layer for the Parley service
//!
//! This module contains core business logic, domain models and the port
//! traits infrastructure adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
