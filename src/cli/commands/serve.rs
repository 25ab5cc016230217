//! `parley serve`: HTTP API plus the expiry sweep, with graceful shutdown.

use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::watch;
use tracing::info;

use crate::adapters::http::ApiServer;
use crate::application::{AppContext, ExpirySweeper};
use crate::domain::models::Config;

pub async fn execute(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let ctx = AppContext::new(config).await?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let sweeper = ExpirySweeper::new(
        ctx.sessions.clone(),
        Duration::from_secs(ctx.config.session.sweep_interval_secs),
    )
    .spawn(stop_rx);

    let server = ApiServer::new(ctx.config.server.clone(), ctx.api_state());
    let served = server
        .serve_with_shutdown(async {
            // A failed signal handler shuts down rather than running unstoppable
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await;

    let _ = stop_tx.send(true);
    let _ = sweeper.await;
    ctx.shutdown().await;

    served.map_err(|e| anyhow!("HTTP server failed: {e}"))
}
