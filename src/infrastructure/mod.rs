//! Process-level plumbing shared by the binary and the tests: configuration
//! loading and the tracing subscriber.

pub mod config;
pub mod logging;
