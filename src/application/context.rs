//! Application context.
//!
//! Owns the database pool and the broadcast hub, and builds every service
//! on top of them. Nothing is global: tests build as many contexts as they
//! need, each with its own store.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::Duration;
use sqlx::SqlitePool;
use tracing::info;

use crate::adapters::broadcast::InProcessBroadcast;
use crate::adapters::http::ApiState;
use crate::adapters::sqlite::{
    create_migrated_test_pool, initialize_from_config, SqliteEscrowRepository, SqliteMessageRepository,
    SqliteNotificationSink, SqliteSessionRepository, SqliteSummonRepository, SqliteWalletRepository,
};
use crate::domain::models::Config;
use crate::domain::ports::{BroadcastChannel, MessageLog};
use crate::services::{EscrowMatcher, MessageService, PledgeLedger, SessionService};

pub struct AppContext {
    pub config: Config,
    pool: SqlitePool,
    broadcast: Arc<InProcessBroadcast>,
    pub sessions: Arc<SessionService>,
    pub messages: Arc<MessageService>,
    pub pledges: Arc<PledgeLedger>,
    pub matcher: Arc<EscrowMatcher>,
    pub escrows: Arc<SqliteEscrowRepository>,
    pub wallets: Arc<SqliteWalletRepository>,
    pub notifications: Arc<SqliteNotificationSink>,
}

impl AppContext {
    /// Open the configured database, migrate it and build the services.
    pub async fn new(config: Config) -> Result<Self> {
        let pool = initialize_from_config(&config.database)
            .await
            .with_context(|| format!("Failed to open database at {}", config.database.path))?;
        Ok(Self::with_pool(config, pool))
    }

    /// Context over a fresh in-memory database.
    pub async fn in_memory(config: Config) -> Result<Self> {
        let pool = create_migrated_test_pool()
            .await
            .context("Failed to create in-memory database")?;
        Ok(Self::with_pool(config, pool))
    }

    /// Build the services over an already migrated pool.
    pub fn with_pool(config: Config, pool: SqlitePool) -> Self {
        let broadcast = Arc::new(InProcessBroadcast::new(config.messaging.broadcast_capacity));

        let session_repo = Arc::new(SqliteSessionRepository::new(pool.clone()));
        let escrows = Arc::new(SqliteEscrowRepository::new(pool.clone()));
        let wallets = Arc::new(SqliteWalletRepository::new(pool.clone()));
        let summons = Arc::new(SqliteSummonRepository::new(pool.clone()));
        let message_repo = Arc::new(SqliteMessageRepository::new(pool.clone()));
        let notifications = Arc::new(SqliteNotificationSink::new(pool.clone()));

        let matcher = Arc::new(EscrowMatcher::new(
            escrows.clone(),
            session_repo.clone(),
            wallets.clone(),
            Duration::seconds(config.escrow.match_window_secs),
        ));
        let sessions = Arc::new(SessionService::new(
            session_repo.clone(),
            escrows.clone(),
            matcher.clone(),
            notifications.clone(),
            config.session.clone(),
        ));
        let messages = Arc::new(MessageService::new(
            session_repo,
            message_repo,
            broadcast.clone(),
            notifications.clone(),
            config.messaging.clone(),
        ));
        let pledges = Arc::new(PledgeLedger::new(summons, notifications.clone(), config.pledge.clone()));

        Self {
            config,
            pool,
            broadcast,
            sessions,
            messages,
            pledges,
            matcher,
            escrows,
            wallets,
            notifications,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn broadcast(&self) -> Arc<dyn BroadcastChannel> {
        self.broadcast.clone()
    }

    /// The durable log as seen by a message stream.
    pub fn message_log(&self) -> Arc<dyn MessageLog> {
        self.messages.clone()
    }

    pub fn poll_interval(&self) -> StdDuration {
        StdDuration::from_millis(self.config.messaging.poll_interval_ms)
    }

    pub fn api_state(&self) -> Arc<ApiState> {
        Arc::new(ApiState {
            sessions: self.sessions.clone(),
            messages: self.messages.clone(),
            pledges: self.pledges.clone(),
            wallets: self.wallets.clone(),
            escrow_watchers: self.config.escrow.watcher_ids.clone(),
        })
    }

    /// Close the broadcast hub, then the pool.
    pub async fn shutdown(self) {
        self.broadcast.close().await;
        self.pool.close().await;
        info!("application context shut down");
    }
}
