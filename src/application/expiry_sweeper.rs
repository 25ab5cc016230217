//! Background sweep that expires stale pending sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::services::SessionService;

pub struct ExpirySweeper {
    sessions: Arc<SessionService>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(sessions: Arc<SessionService>, interval: Duration) -> Self {
        Self { sessions, interval }
    }

    /// Run one sweep. Failures are logged and retried on the next tick.
    pub async fn sweep_once(&self) -> usize {
        match self.sessions.expire_stale().await {
            Ok(expired) => {
                debug!(expired, "expiry sweep finished");
                expired
            }
            Err(e) => {
                warn!(error = %e, "expiry sweep failed");
                0
            }
        }
    }

    /// Sweep on a fixed interval until `shutdown` flips to true.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep_once().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("expiry sweeper stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}
