//! Session lifecycle controller.
//!
//! Owns session state transitions. Every transition is a conditional write
//! against the stored status, so racing callers cannot both win. Escrow
//! status propagation and notifications are secondary writes: their failures
//! are logged and never undo the transition.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::escrow_matcher::EscrowMatcher;
use super::notify_best_effort;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    EscrowRecord, EscrowStatus, Notification, NotificationKind, Session, SessionConfig, SessionStatus,
};
use crate::domain::ports::{EscrowRepository, NotificationSink, SessionRepository};

pub struct SessionService {
    sessions: Arc<dyn SessionRepository>,
    escrows: Arc<dyn EscrowRepository>,
    matcher: Arc<EscrowMatcher>,
    notifier: Arc<dyn NotificationSink>,
    config: SessionConfig,
}

impl SessionService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        escrows: Arc<dyn EscrowRepository>,
        matcher: Arc<EscrowMatcher>,
        notifier: Arc<dyn NotificationSink>,
        config: SessionConfig,
    ) -> Self {
        Self { sessions, escrows, matcher, notifier, config }
    }

    /// Open a pending session from `initiator_id` to `recipient_id`.
    #[instrument(skip(self), err)]
    pub async fn initiate(&self, initiator_id: Uuid, recipient_id: Uuid, amount: i64) -> DomainResult<Session> {
        let session = Session::new(initiator_id, recipient_id, amount);
        session
            .validate(self.config.min_amount)
            .map_err(DomainError::ValidationFailed)?;

        self.sessions.create(&session).await?;
        info!(session_id = %session.id, amount, "session initiated");

        notify_best_effort(
            self.notifier.as_ref(),
            Notification::new(
                NotificationKind::SessionRequested,
                recipient_id,
                json!({ "session_id": session.id, "initiator_id": initiator_id, "amount": amount }),
            ),
        )
        .await;

        Ok(session)
    }

    /// Load a session visible to `caller_id`.
    pub async fn get(&self, session_id: Uuid, caller_id: Uuid) -> DomainResult<Session> {
        let session = self.load(session_id).await?;
        if !session.is_participant(caller_id) {
            return Err(DomainError::Forbidden("caller is not a participant of this session".to_string()));
        }
        Ok(session)
    }

    /// Recipient accepts a pending session.
    #[instrument(skip(self), err)]
    pub async fn accept(&self, session_id: Uuid, caller_id: Uuid) -> DomainResult<Session> {
        let mut session = self.load(session_id).await?;

        if caller_id != session.recipient_id {
            return Err(DomainError::Forbidden("only the recipient can accept a session".to_string()));
        }
        if session.status != SessionStatus::Pending {
            return Err(DomainError::NotPending { session_id, status: session.status });
        }

        let now = Utc::now();
        if !self
            .sessions
            .transition(session_id, SessionStatus::Pending, SessionStatus::Active, now)
            .await?
        {
            return Err(self.not_pending(&session).await);
        }
        session.status = SessionStatus::Active;
        session.updated_at = now;
        info!(%session_id, "session accepted");

        self.accept_linked_escrow(&session).await;

        notify_best_effort(
            self.notifier.as_ref(),
            Notification::new(
                NotificationKind::SessionAccepted,
                session.initiator_id,
                json!({ "session_id": session.id, "recipient_id": session.recipient_id }),
            ),
        )
        .await;

        Ok(session)
    }

    /// Either participant withdraws a pending session.
    #[instrument(skip(self), err)]
    pub async fn cancel(&self, session_id: Uuid, caller_id: Uuid) -> DomainResult<Session> {
        let mut session = self.get(session_id, caller_id).await?;
        if session.status != SessionStatus::Pending {
            return Err(DomainError::NotPending { session_id, status: session.status });
        }

        let now = Utc::now();
        if !self
            .sessions
            .transition(session_id, SessionStatus::Pending, SessionStatus::Cancelled, now)
            .await?
        {
            return Err(self.not_pending(&session).await);
        }
        session.status = SessionStatus::Cancelled;
        session.updated_at = now;
        info!(%session_id, "session cancelled");

        if let Some(counterpart) = session.counterpart_of(caller_id) {
            notify_best_effort(
                self.notifier.as_ref(),
                Notification::new(
                    NotificationKind::SessionCancelled,
                    counterpart,
                    json!({ "session_id": session.id, "cancelled_by": caller_id }),
                ),
            )
            .await;
        }

        Ok(session)
    }

    /// Close an active session. Triggered by the release path, not by participants.
    #[instrument(skip(self), err)]
    pub async fn complete(&self, session_id: Uuid) -> DomainResult<Session> {
        let mut session = self.load(session_id).await?;
        let invalid = |from| DomainError::InvalidStateTransition { from, to: SessionStatus::Completed };

        if session.status != SessionStatus::Active {
            return Err(invalid(session.status));
        }

        let now = Utc::now();
        if !self
            .sessions
            .transition(session_id, SessionStatus::Active, SessionStatus::Completed, now)
            .await?
        {
            let current = self.load(session_id).await?.status;
            return Err(invalid(current));
        }
        session.status = SessionStatus::Completed;
        session.updated_at = now;
        info!(%session_id, "session completed");
        Ok(session)
    }

    /// Cancel every pending session created before `cutoff`. Returns how many expired.
    #[instrument(skip(self), err)]
    pub async fn expire_pending(&self, cutoff: DateTime<Utc>) -> DomainResult<usize> {
        let stale = self.sessions.list_pending_before(cutoff).await?;
        let now = Utc::now();
        let mut expired = 0;

        for session in stale {
            // Losing the race to an accept is fine
            if self
                .sessions
                .transition(session.id, SessionStatus::Pending, SessionStatus::Cancelled, now)
                .await?
            {
                expired += 1;
            }
        }

        if expired > 0 {
            info!(expired, "expired stale pending sessions");
        }
        Ok(expired)
    }

    /// Expire pending sessions older than the configured time-to-live.
    pub async fn expire_stale(&self) -> DomainResult<usize> {
        let cutoff = Utc::now() - Duration::hours(self.config.pending_ttl_hours);
        self.expire_pending(cutoff).await
    }

    /// Ingest an escrow record from the chain watcher, linking it when it
    /// names its session.
    ///
    /// Redelivery of a known `external_id` reuses the stored record.
    #[instrument(skip(self, record), fields(external_id = %record.external_id), err)]
    pub async fn record_escrow(&self, mut record: EscrowRecord) -> DomainResult<EscrowRecord> {
        record.validate().map_err(DomainError::ValidationFailed)?;

        let reference = record.session_id.take();
        if let Some(session_id) = reference {
            self.load(session_id).await?;
        }

        let record = match self.escrows.get_by_external_id(&record.external_id).await? {
            Some(existing) => {
                tracing::debug!(escrow_id = %existing.id, "escrow record already known");
                existing
            }
            None => {
                self.escrows.create(&record).await?;
                info!(escrow_id = %record.id, "escrow record stored");
                record
            }
        };

        match reference {
            Some(session_id) => self.matcher.link_by_reference(session_id, record.id).await,
            None => Ok(record),
        }
    }

    /// The escrow backing a session, resolved through the matcher.
    pub async fn escrow_for(&self, session_id: Uuid, caller_id: Uuid) -> DomainResult<Option<EscrowRecord>> {
        let session = self.get(session_id, caller_id).await?;
        self.matcher.find_candidate(&session).await
    }

    /// Explicitly link an escrow record to a session on behalf of a participant.
    pub async fn link_escrow(&self, session_id: Uuid, escrow_id: Uuid, caller_id: Uuid) -> DomainResult<EscrowRecord> {
        self.get(session_id, caller_id).await?;
        self.matcher.link_by_reference(session_id, escrow_id).await
    }

    async fn load(&self, session_id: Uuid) -> DomainResult<Session> {
        self.sessions
            .get(session_id)
            .await?
            .ok_or(DomainError::SessionNotFound(session_id))
    }

    /// Error for a lost conditional transition, carrying the status that won.
    async fn not_pending(&self, session: &Session) -> DomainError {
        let status = match self.sessions.get(session.id).await {
            Ok(Some(current)) => current.status,
            _ => session.status,
        };
        DomainError::NotPending { session_id: session.id, status }
    }

    async fn accept_linked_escrow(&self, session: &Session) {
        match self.matcher.find_candidate(session).await {
            Ok(Some(record)) if record.status == EscrowStatus::Pending => {
                if let Err(e) = self.escrows.update_status(record.id, EscrowStatus::Accepted).await {
                    warn!(session_id = %session.id, escrow_id = %record.id, error = %e, "failed to mark escrow accepted");
                }
            }
            Ok(Some(record)) => {
                tracing::debug!(escrow_id = %record.id, status = %record.status, "escrow already past pending");
            }
            Ok(None) => {
                tracing::debug!(session_id = %session.id, "no escrow linked at accept time");
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "escrow lookup failed during accept");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteEscrowRepository, SqliteNotificationSink, SqliteSessionRepository,
        SqliteWalletRepository,
    };
    use crate::domain::models::Wallet;
    use crate::domain::ports::WalletResolver;

    struct Fixture {
        service: SessionService,
        escrows: Arc<SqliteEscrowRepository>,
        wallets: Arc<SqliteWalletRepository>,
        notifications: Arc<SqliteNotificationSink>,
    }

    async fn setup() -> Fixture {
        let pool = create_migrated_test_pool().await.unwrap();
        let sessions = Arc::new(SqliteSessionRepository::new(pool.clone()));
        let escrows = Arc::new(SqliteEscrowRepository::new(pool.clone()));
        let wallets = Arc::new(SqliteWalletRepository::new(pool.clone()));
        let notifications = Arc::new(SqliteNotificationSink::new(pool));
        let matcher = Arc::new(EscrowMatcher::new(
            escrows.clone(),
            sessions.clone(),
            wallets.clone(),
            Duration::minutes(5),
        ));
        let service = SessionService::new(
            sessions,
            escrows.clone(),
            matcher,
            notifications.clone(),
            SessionConfig::default(),
        );
        Fixture { service, escrows, wallets, notifications }
    }

    #[tokio::test]
    async fn test_initiate_validates_and_notifies() {
        let fx = setup().await;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let session = fx.service.initiate(alice, bob, 100).await.unwrap();
        assert_eq!(session.status, SessionStatus::Pending);

        let queued = fx.notifications.list_for_user(bob).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].kind, NotificationKind::SessionRequested);

        let err = fx.service.initiate(alice, bob, 0).await.unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
        let err = fx.service.initiate(alice, alice, 10).await.unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_accept_rules() {
        let fx = setup().await;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let session = fx.service.initiate(alice, bob, 100).await.unwrap();

        let err = fx.service.accept(session.id, alice).await.unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        let accepted = fx.service.accept(session.id, bob).await.unwrap();
        assert_eq!(accepted.status, SessionStatus::Active);

        let err = fx.service.accept(session.id, bob).await.unwrap_err();
        assert!(matches!(err, DomainError::NotPending { status: SessionStatus::Active, .. }));

        let initiator_inbox = fx.notifications.list_for_user(alice).await.unwrap();
        assert!(initiator_inbox.iter().any(|n| n.kind == NotificationKind::SessionAccepted));
    }

    #[tokio::test]
    async fn test_accept_unknown_session() {
        let fx = setup().await;
        let err = fx.service.accept(Uuid::new_v4(), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DomainError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_accept_moves_linked_escrow_to_accepted() {
        let fx = setup().await;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let session = fx.service.initiate(alice, bob, 100).await.unwrap();
        fx.wallets.register(&Wallet::new(bob, "0xb0b", true)).await.unwrap();

        let record = EscrowRecord::new("deposit-7", "0xa11ce", "0xb0b", 100).with_session(session.id);
        let stored = fx.service.record_escrow(record).await.unwrap();
        assert_eq!(stored.session_id, Some(session.id));

        fx.service.accept(session.id, bob).await.unwrap();

        let escrow = fx.escrows.get(stored.id).await.unwrap().unwrap();
        assert_eq!(escrow.status, EscrowStatus::Accepted);
    }

    #[tokio::test]
    async fn test_concurrent_accepts_have_one_winner() {
        let fx = Arc::new(setup().await);
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let session = fx.service.initiate(alice, bob, 100).await.unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let fx = fx.clone();
                tokio::spawn(async move { fx.service.accept(session.id, bob).await })
            })
            .collect();

        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(DomainError::NotPending { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_cancel_and_complete() {
        let fx = setup().await;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let first = fx.service.initiate(alice, bob, 10).await.unwrap();
        let err = fx.service.cancel(first.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
        let cancelled = fx.service.cancel(first.id, alice).await.unwrap();
        assert_eq!(cancelled.status, SessionStatus::Cancelled);

        let second = fx.service.initiate(alice, bob, 10).await.unwrap();
        let err = fx.service.complete(second.id).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
        fx.service.accept(second.id, bob).await.unwrap();
        let done = fx.service.complete(second.id).await.unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_expire_pending_only_touches_stale_sessions() {
        let fx = setup().await;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let stale = fx.service.initiate(alice, bob, 10).await.unwrap();
        let accepted = fx.service.initiate(alice, bob, 10).await.unwrap();
        fx.service.accept(accepted.id, bob).await.unwrap();

        let expired = fx.service.expire_pending(Utc::now() + Duration::seconds(1)).await.unwrap();
        assert_eq!(expired, 1);

        assert_eq!(fx.service.get(stale.id, alice).await.unwrap().status, SessionStatus::Cancelled);
        assert_eq!(fx.service.get(accepted.id, alice).await.unwrap().status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_record_escrow_for_unknown_session() {
        let fx = setup().await;
        let record = EscrowRecord::new("orphan", "0x1", "0x2", 5).with_session(Uuid::new_v4());
        let err = fx.service.record_escrow(record).await.unwrap_err();
        assert!(matches!(err, DomainError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_record_escrow_redelivery_reuses_record() {
        let fx = setup().await;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let session = fx.service.initiate(alice, bob, 30).await.unwrap();
        fx.wallets.register(&Wallet::new(bob, "0xb", true)).await.unwrap();

        let first = fx
            .service
            .record_escrow(EscrowRecord::new("deposit-9", "0xa", "0xb", 30))
            .await
            .unwrap();
        assert!(!first.is_linked());

        let again = fx
            .service
            .record_escrow(EscrowRecord::new("deposit-9", "0xa", "0xb", 30).with_session(session.id))
            .await
            .unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.session_id, Some(session.id));
    }

    #[tokio::test]
    async fn test_forged_escrow_cannot_claim_the_session() {
        let fx = setup().await;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let session = fx.service.initiate(alice, bob, 100).await.unwrap();
        fx.wallets.register(&Wallet::new(bob, "0xb0b", true)).await.unwrap();

        let forged = EscrowRecord::new("forged", "0xe11e", "0xb0b", 1).with_session(session.id);
        let err = fx.service.record_escrow(forged).await.unwrap_err();
        assert!(matches!(err, DomainError::EscrowMismatch { .. }));

        // The genuine deposit still links
        let real = EscrowRecord::new("real", "0xa11ce", "0xb0b", 100).with_session(session.id);
        let stored = fx.service.record_escrow(real).await.unwrap();
        assert_eq!(stored.session_id, Some(session.id));
    }

    #[tokio::test]
    async fn test_participant_cannot_link_escrow_paid_elsewhere() {
        let fx = setup().await;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let session = fx.service.initiate(alice, bob, 40).await.unwrap();
        fx.wallets.register(&Wallet::new(bob, "0xb0b", true)).await.unwrap();
        let other = EscrowRecord::new("other", "0xa11ce", "0xca401", 40);
        fx.escrows.create(&other).await.unwrap();

        let err = fx.service.link_escrow(session.id, other.id, alice).await.unwrap_err();
        assert!(matches!(err, DomainError::EscrowMismatch { .. }));
        assert!(fx.service.escrow_for(session.id, alice).await.unwrap().is_none());
    }
}
