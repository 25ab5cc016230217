//! Infrastructure adapters for external systems.

pub mod broadcast;
pub mod http;
pub mod sqlite;
