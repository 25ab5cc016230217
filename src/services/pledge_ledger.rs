//! Pledge ledger service.
//!
//! Submissions for one summon are serialized by an in-process keyed lock and
//! committed with a version compare-and-swap in the store, so writers in
//! other processes are also safe. A lost compare-and-swap or a busy store is
//! retried with exponential backoff. The durable write runs on its own task
//! and completes even if the caller goes away.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::notify_best_effort;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{BackerEntry, BackerStats, Notification, NotificationKind, PledgeConfig, Summon, SummonTarget};
use crate::domain::ports::{NotificationSink, SummonRepository};

const RETRY_INITIAL_INTERVAL: Duration = Duration::from_millis(5);
const RETRY_MAX_INTERVAL: Duration = Duration::from_millis(250);
const RETRY_MAX_ELAPSED: Duration = Duration::from_secs(5);

/// Lock table handing out one async mutex per key.
#[derive(Default)]
struct KeyedLocks {
    table: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    async fn handle(&self, key: Uuid) -> Arc<Mutex<()>> {
        self.table.lock().await.entry(key).or_default().clone()
    }

    /// Drop the table entry once nobody else holds or waits on it.
    async fn release(&self, key: Uuid, handle: Arc<Mutex<()>>) {
        let mut table = self.table.lock().await;
        // One reference in the table, one here
        if Arc::strong_count(&handle) <= 2 {
            table.remove(&key);
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.table.lock().await.len()
    }
}

pub struct PledgeLedger {
    summons: Arc<dyn SummonRepository>,
    notifier: Arc<dyn NotificationSink>,
    locks: Arc<KeyedLocks>,
    config: PledgeConfig,
}

impl PledgeLedger {
    pub fn new(
        summons: Arc<dyn SummonRepository>,
        notifier: Arc<dyn NotificationSink>,
        config: PledgeConfig,
    ) -> Self {
        Self {
            summons,
            notifier,
            locks: Arc::new(KeyedLocks::default()),
            config,
        }
    }

    /// Open a new summon toward `target`.
    #[instrument(skip(self, target), fields(target = %target.name), err)]
    pub async fn create_summon(&self, creator_id: Uuid, target: SummonTarget) -> DomainResult<Summon> {
        let summon = Summon::new(creator_id, target);
        summon.validate().map_err(DomainError::ValidationFailed)?;
        self.summons.create(&summon).await?;
        info!(summon_id = %summon.id, "summon created");
        Ok(summon)
    }

    pub async fn get_summon(&self, summon_id: Uuid) -> DomainResult<Summon> {
        self.summons
            .get(summon_id)
            .await?
            .ok_or(DomainError::SummonNotFound(summon_id))
    }

    /// Record a pledge of `amount` by `backer_id`.
    ///
    /// A backer pledges at most once per summon. On success the returned
    /// summon reflects this entry and every entry committed before it.
    #[instrument(skip(self), err)]
    pub async fn submit(&self, summon_id: Uuid, backer_id: Uuid, amount: i64) -> DomainResult<Summon> {
        if amount <= 0 {
            return Err(DomainError::ValidationFailed(format!("Pledge amount must be positive, got {amount}")));
        }
        if amount < self.config.min_amount {
            return Err(DomainError::ValidationFailed(format!(
                "Pledge amount {amount} is below the minimum of {}",
                self.config.min_amount
            )));
        }

        let summons = self.summons.clone();
        let locks = self.locks.clone();
        let attempts = self.config.max_cas_attempts.max(1);

        let summon = tokio::spawn(async move {
            let handle = locks.handle(summon_id).await;
            let result = {
                let _guard = handle.lock().await;
                append_with_retry(summons.as_ref(), summon_id, backer_id, amount, attempts).await
            };
            locks.release(summon_id, handle).await;
            result
        })
        .await
        .map_err(|e| DomainError::DependencyUnavailable(format!("pledge task failed: {e}")))??;

        info!(%summon_id, %backer_id, amount, total = summon.total_pledged, "pledge recorded");

        if let Err(e) = self.summons.increment_backer_stats(backer_id, amount).await {
            warn!(%backer_id, error = %e, "failed to update lifetime backer stats");
        }

        notify_best_effort(
            self.notifier.as_ref(),
            Notification::new(
                NotificationKind::SummonBacked,
                summon.creator_id,
                json!({
                    "summon_id": summon_id,
                    "backer_id": backer_id,
                    "amount": amount,
                    "total_pledged": summon.total_pledged,
                }),
            ),
        )
        .await;

        Ok(summon)
    }

    pub async fn backer_stats(&self, backer_id: Uuid) -> DomainResult<BackerStats> {
        self.summons.backer_stats(backer_id).await
    }

    /// Rebuild a backer's lifetime counters from the ledger entries.
    pub async fn recompute_backer_stats(&self, backer_id: Uuid) -> DomainResult<BackerStats> {
        let stats = self.summons.recompute_backer_stats(backer_id).await?;
        info!(%backer_id, pledge_count = stats.pledge_count, "backer stats recomputed");
        Ok(stats)
    }
}

fn retry_policy() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(RETRY_INITIAL_INTERVAL)
        .with_max_interval(RETRY_MAX_INTERVAL)
        .with_max_elapsed_time(Some(RETRY_MAX_ELAPSED))
        .build()
}

/// Append with backoff. Only a concurrency conflict is retried, at most
/// `attempts` tries in total.
async fn append_with_retry(
    summons: &dyn SummonRepository,
    summon_id: Uuid,
    backer_id: Uuid,
    amount: i64,
    attempts: u32,
) -> DomainResult<Summon> {
    let mut attempt = 0u32;
    backoff::future::retry(retry_policy(), || {
        attempt += 1;
        let attempt = attempt;
        async move {
            append_once(summons, summon_id, backer_id, amount)
                .await
                .map_err(|e| match e {
                    DomainError::ConcurrencyConflict { .. } if attempt < attempts => {
                        debug!(%summon_id, attempt, "summon version moved, retrying");
                        backoff::Error::transient(e)
                    }
                    other => backoff::Error::permanent(other),
                })
        }
    })
    .await
}

async fn append_once(
    summons: &dyn SummonRepository,
    summon_id: Uuid,
    backer_id: Uuid,
    amount: i64,
) -> DomainResult<Summon> {
    let summon = summons
        .get(summon_id)
        .await?
        .ok_or(DomainError::SummonNotFound(summon_id))?;

    if summon.has_backer(backer_id) {
        return Err(DomainError::AlreadyBacked { summon_id, backer_id });
    }
    if summon.total_after(amount).is_none() {
        return Err(DomainError::ValidationFailed(format!(
            "Pledge of {amount} would overflow the total of summon {summon_id}"
        )));
    }

    let entry = BackerEntry::new(backer_id, amount);
    summons.append_entry(summon_id, &entry, summon.version).await
}
