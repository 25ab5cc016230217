//! Shared fixtures for integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use parley::domain::models::{Config, EscrowRecord, Session, Wallet};
use parley::domain::ports::WalletResolver;
use parley::AppContext;
use uuid::Uuid;

/// Application context over a fresh in-memory database.
pub async fn context() -> AppContext {
    AppContext::in_memory(Config::default())
        .await
        .expect("Failed to build in-memory context")
}

/// Context with a custom configuration.
pub async fn context_with(config: Config) -> AppContext {
    AppContext::in_memory(config)
        .await
        .expect("Failed to build in-memory context")
}

/// Register a primary wallet for `user_id`.
pub async fn register_wallet(ctx: &AppContext, user_id: Uuid, address: &str) {
    ctx.wallets
        .register(&Wallet::new(user_id, address, true))
        .await
        .expect("Failed to register wallet");
}

/// Initiate a session and have the recipient accept it.
pub async fn active_session(ctx: &AppContext, amount: i64) -> Session {
    let session = ctx
        .sessions
        .initiate(Uuid::new_v4(), Uuid::new_v4(), amount)
        .await
        .expect("Failed to initiate session");
    ctx.sessions
        .accept(session.id, session.recipient_id)
        .await
        .expect("Failed to accept session")
}

/// An unlinked deposit from `depositor` to `recipient` made at `at`.
pub fn deposit(depositor: &str, recipient: &str, amount: i64, at: DateTime<Utc>) -> EscrowRecord {
    EscrowRecord::new(format!("tx-{}", Uuid::new_v4()), depositor, recipient, amount).with_created_at(at)
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
