//! Parley - escrow-gated paid conversations and crowd-pledge summons
//!
//! Parley is the off-chain layer between an external escrow ledger and the
//! application's session, pledge and messaging state.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, errors and port traits
//! - **Service Layer** (`services`): escrow matching, session lifecycle,
//!   pledge ledger, messaging and the client-side message reconciler
//! - **Adapters** (`adapters`): SQLite repositories, the in-process broadcast
//!   hub and the axum HTTP API
//! - **Application Layer** (`application`): context wiring and background jobs
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use application::AppContext;
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, EscrowRecord, EscrowStatus, Message, Session, SessionStatus, Summon, SummonTarget,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{EscrowMatcher, MessageService, MessageStream, PledgeLedger, SessionService};
