//! HTTP API.
//!
//! JSON over axum. Every `/api/v1` route requires the caller identity
//! header; `/health` is open.

pub mod caller;
pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub use caller::{Caller, CALLER_HEADER};
pub use error::{ApiError, ErrorResponse};

use crate::domain::models::ServerConfig;
use crate::domain::ports::WalletResolver;
use crate::services::{MessageService, PledgeLedger, SessionService};

/// Services shared by all handlers.
pub struct ApiState {
    pub sessions: Arc<SessionService>,
    pub messages: Arc<MessageService>,
    pub pledges: Arc<PledgeLedger>,
    pub wallets: Arc<dyn WalletResolver>,
    /// Callers allowed to ingest escrow records
    pub escrow_watchers: Vec<Uuid>,
}

/// Build the router with its layers.
pub fn router(state: Arc<ApiState>, enable_cors: bool) -> Router {
    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/v1/sessions", post(handlers::initiate_session))
        .route("/api/v1/sessions/{id}", get(handlers::get_session))
        .route("/api/v1/sessions/{id}/accept", post(handlers::accept_session))
        .route("/api/v1/sessions/{id}/cancel", post(handlers::cancel_session))
        .route(
            "/api/v1/sessions/{id}/escrow",
            get(handlers::get_session_escrow).post(handlers::link_session_escrow),
        )
        .route(
            "/api/v1/sessions/{id}/messages",
            get(handlers::list_messages).post(handlers::post_message),
        )
        .route("/api/v1/messages/{id}/read", post(handlers::mark_message_read))
        .route("/api/v1/escrows", post(handlers::ingest_escrow))
        .route("/api/v1/wallets", post(handlers::register_wallet))
        .route("/api/v1/summons", post(handlers::create_summon))
        .route("/api/v1/summons/{id}", get(handlers::get_summon))
        .route("/api/v1/summons/{id}/pledges", post(handlers::submit_pledge))
        .with_state(state);

    if enable_cors {
        app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
    } else {
        app.layer(TraceLayer::new_for_http())
    }
}

/// The HTTP server.
pub struct ApiServer {
    config: ServerConfig,
    state: Arc<ApiState>,
}

impl ApiServer {
    pub fn new(config: ServerConfig, state: Arc<ApiState>) -> Self {
        Self { config, state }
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn serve_with_shutdown<F>(
        self,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let app = router(self.state, self.config.enable_cors);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Parley API listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}
