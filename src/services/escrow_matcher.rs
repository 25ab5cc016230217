//! Escrow matcher.
//!
//! Resolves which escrow record pays for a session. Explicit links come
//! first; deposits made before sessions carried a reference are found by a
//! time-bounded heuristic and linked on the spot so later lookups take the
//! primary path.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{normalize_address, EscrowRecord, Session};
use crate::domain::ports::{EscrowRepository, LinkOutcome, SessionRepository, WalletResolver};

/// One link-resolution strategy. Rules are tried in order; the first hit wins.
#[async_trait]
pub trait MatchRule: Send + Sync {
    fn name(&self) -> &'static str;

    async fn find(&self, session: &Session) -> DomainResult<Option<EscrowRecord>>;
}

/// Records that already point at the session.
pub struct LinkedReferenceRule {
    escrows: Arc<dyn EscrowRepository>,
}

impl LinkedReferenceRule {
    pub fn new(escrows: Arc<dyn EscrowRepository>) -> Self {
        Self { escrows }
    }
}

#[async_trait]
impl MatchRule for LinkedReferenceRule {
    fn name(&self) -> &'static str {
        "linked_reference"
    }

    async fn find(&self, session: &Session) -> DomainResult<Option<EscrowRecord>> {
        let mut linked = self.escrows.find_by_session(session.id).await?;
        Ok(if linked.is_empty() { None } else { Some(linked.remove(0)) })
    }
}

/// Unlinked deposits paid to the recipient's wallet for the exact session
/// amount within `window` of the session's creation.
pub struct LegacyDepositRule {
    escrows: Arc<dyn EscrowRepository>,
    wallets: Arc<dyn WalletResolver>,
    window: Duration,
}

impl LegacyDepositRule {
    pub fn new(
        escrows: Arc<dyn EscrowRepository>,
        wallets: Arc<dyn WalletResolver>,
        window: Duration,
    ) -> Self {
        Self { escrows, wallets, window }
    }
}

/// Inclusive `[at - window, at + window]`.
pub fn match_window(at: DateTime<Utc>, window: Duration) -> (DateTime<Utc>, DateTime<Utc>) {
    (at - window, at + window)
}

/// Whether `record` satisfies the legacy deposit predicate for `session`.
pub fn is_legacy_candidate(
    record: &EscrowRecord,
    session: &Session,
    recipient_address: &str,
    window: Duration,
) -> bool {
    let (from, to) = match_window(session.created_at, window);
    !record.is_linked()
        && record.amount == session.amount
        && normalize_address(&record.recipient_address) == normalize_address(recipient_address)
        && record.created_at >= from
        && record.created_at <= to
}

#[async_trait]
impl MatchRule for LegacyDepositRule {
    fn name(&self) -> &'static str {
        "legacy_deposit"
    }

    async fn find(&self, session: &Session) -> DomainResult<Option<EscrowRecord>> {
        let Some(address) = self.wallets.primary_address(session.recipient_id).await? else {
            tracing::debug!(session_id = %session.id, "recipient has no wallet on file");
            return Ok(None);
        };

        let (from, to) = match_window(session.created_at, self.window);
        let mut candidates: Vec<EscrowRecord> = self
            .escrows
            .find_unlinked(&normalize_address(&address), session.amount, from, to)
            .await?
            .into_iter()
            .filter(|r| is_legacy_candidate(r, session, &address, self.window))
            .collect();
        candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        for mut candidate in candidates {
            match self.escrows.try_link(candidate.id, session.id).await? {
                LinkOutcome::Linked | LinkOutcome::AlreadyLinkedToSession => {
                    tracing::info!(
                        session_id = %session.id,
                        escrow_id = %candidate.id,
                        "linked legacy deposit to session"
                    );
                    candidate.session_id = Some(session.id);
                    return Ok(Some(candidate));
                }
                LinkOutcome::Conflict => {
                    // Claimed by another session in the meantime, or this
                    // session got linked by another caller
                    if let Some(linked) = self.escrows.find_by_session(session.id).await?.into_iter().next() {
                        return Ok(Some(linked));
                    }
                }
            }
        }

        Ok(None)
    }
}

/// Ordered chain of match rules plus the explicit link operation.
pub struct EscrowMatcher {
    rules: Vec<Box<dyn MatchRule>>,
    escrows: Arc<dyn EscrowRepository>,
    sessions: Arc<dyn SessionRepository>,
    wallets: Arc<dyn WalletResolver>,
}

impl EscrowMatcher {
    /// Matcher with the linked-reference rule followed by the legacy deposit rule.
    pub fn new(
        escrows: Arc<dyn EscrowRepository>,
        sessions: Arc<dyn SessionRepository>,
        wallets: Arc<dyn WalletResolver>,
        window: Duration,
    ) -> Self {
        let rules: Vec<Box<dyn MatchRule>> = vec![
            Box::new(LinkedReferenceRule::new(escrows.clone())),
            Box::new(LegacyDepositRule::new(escrows.clone(), wallets.clone(), window)),
        ];
        Self::with_rules(rules, escrows, sessions, wallets)
    }

    pub fn with_rules(
        rules: Vec<Box<dyn MatchRule>>,
        escrows: Arc<dyn EscrowRepository>,
        sessions: Arc<dyn SessionRepository>,
        wallets: Arc<dyn WalletResolver>,
    ) -> Self {
        Self { rules, escrows, sessions, wallets }
    }

    /// First escrow record any rule resolves for `session`.
    pub async fn find_candidate(&self, session: &Session) -> DomainResult<Option<EscrowRecord>> {
        for rule in &self.rules {
            if let Some(record) = rule.find(session).await? {
                tracing::debug!(
                    rule = rule.name(),
                    session_id = %session.id,
                    escrow_id = %record.id,
                    "escrow match"
                );
                return Ok(Some(record));
            }
        }
        tracing::debug!(session_id = %session.id, "no escrow match");
        Ok(None)
    }

    /// Explicitly link an escrow record to a session.
    ///
    /// Idempotent for the same pair. Never replaces an existing link. The
    /// record must pay the session amount to the recipient's wallet.
    pub async fn link_by_reference(&self, session_id: Uuid, escrow_id: Uuid) -> DomainResult<EscrowRecord> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(DomainError::SessionNotFound(session_id))?;
        let mut record = self
            .escrows
            .get(escrow_id)
            .await?
            .ok_or(DomainError::EscrowNotFound(escrow_id))?;

        let current = record.session_id;
        match current {
            Some(linked) if linked == session_id => return Ok(record),
            Some(_) => return Err(DomainError::AlreadyLinked { session_id, escrow_id }),
            None => {}
        }
        self.check_fit(&record, &session).await?;

        match self.escrows.try_link(escrow_id, session_id).await? {
            LinkOutcome::Linked => {
                tracing::info!(%session_id, %escrow_id, "escrow linked by reference");
                record.session_id = Some(session_id);
                Ok(record)
            }
            LinkOutcome::AlreadyLinkedToSession => {
                record.session_id = Some(session_id);
                Ok(record)
            }
            LinkOutcome::Conflict => {
                tracing::warn!(%session_id, %escrow_id, "escrow link conflict");
                Err(DomainError::AlreadyLinked { session_id, escrow_id })
            }
        }
    }

    /// Reject a record that does not pay this session.
    async fn check_fit(&self, record: &EscrowRecord, session: &Session) -> DomainResult<()> {
        let mismatch = |reason: String| DomainError::EscrowMismatch {
            session_id: session.id,
            escrow_id: record.id,
            reason,
        };

        if record.amount != session.amount {
            return Err(mismatch(format!(
                "escrow amount {} differs from session amount {}",
                record.amount, session.amount
            )));
        }

        let Some(address) = self.wallets.primary_address(session.recipient_id).await? else {
            return Err(mismatch("recipient has no wallet on file".to_string()));
        };
        if normalize_address(&record.recipient_address) != normalize_address(&address) {
            tracing::warn!(session_id = %session.id, escrow_id = %record.id, "escrow pays a different recipient");
            return Err(mismatch("escrow recipient is not the session recipient's wallet".to_string()));
        }
        Ok(())
    }

    /// The escrow record linked to a session, if any.
    pub async fn linked_escrow(&self, session_id: Uuid) -> DomainResult<Option<EscrowRecord>> {
        Ok(self.escrows.find_by_session(session_id).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteEscrowRepository, SqliteSessionRepository, SqliteWalletRepository,
    };
    use crate::domain::models::Wallet;

    struct Fixture {
        matcher: EscrowMatcher,
        escrows: Arc<SqliteEscrowRepository>,
        sessions: Arc<SqliteSessionRepository>,
        wallets: Arc<SqliteWalletRepository>,
    }

    async fn setup() -> Fixture {
        let pool = create_migrated_test_pool().await.unwrap();
        let escrows = Arc::new(SqliteEscrowRepository::new(pool.clone()));
        let sessions = Arc::new(SqliteSessionRepository::new(pool.clone()));
        let wallets = Arc::new(SqliteWalletRepository::new(pool));
        let matcher = EscrowMatcher::new(
            escrows.clone(),
            sessions.clone(),
            wallets.clone(),
            Duration::minutes(5),
        );
        Fixture { matcher, escrows, sessions, wallets }
    }

    async fn session_with_wallet(fx: &Fixture, amount: i64, address: &str) -> Session {
        let session = Session::new(Uuid::new_v4(), Uuid::new_v4(), amount);
        fx.sessions.create(&session).await.unwrap();
        fx.wallets.register(&Wallet::new(session.recipient_id, address, true)).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_legacy_deposit_inside_window_is_found_and_linked() {
        let fx = setup().await;
        let session = session_with_wallet(&fx, 50, "0xABC").await;
        let deposit = EscrowRecord::new("dep-1", "0xdead", "0xabc", 50)
            .with_created_at(session.created_at + Duration::minutes(2));
        fx.escrows.create(&deposit).await.unwrap();

        let found = fx.matcher.find_candidate(&session).await.unwrap().unwrap();
        assert_eq!(found.id, deposit.id);
        assert_eq!(found.session_id, Some(session.id));

        // Subsequent lookups hit the primary rule
        let linked = fx.escrows.find_by_session(session.id).await.unwrap();
        assert_eq!(linked.len(), 1);
    }

    #[tokio::test]
    async fn test_legacy_deposit_outside_window_is_ignored() {
        let fx = setup().await;
        let session = session_with_wallet(&fx, 50, "0xABC").await;
        let deposit = EscrowRecord::new("dep-1", "0xdead", "0xabc", 50)
            .with_created_at(session.created_at + Duration::minutes(10));
        fx.escrows.create(&deposit).await.unwrap();

        assert!(fx.matcher.find_candidate(&session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_wallet_yields_none() {
        let fx = setup().await;
        let session = Session::new(Uuid::new_v4(), Uuid::new_v4(), 50);
        fx.sessions.create(&session).await.unwrap();

        assert!(fx.matcher.find_candidate(&session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_most_recent_deposit_wins() {
        let fx = setup().await;
        let session = session_with_wallet(&fx, 20, "0xabc").await;
        let older = EscrowRecord::new("old", "0x1", "0xabc", 20)
            .with_created_at(session.created_at - Duration::minutes(3));
        let newer = EscrowRecord::new("new", "0x2", "0xabc", 20)
            .with_created_at(session.created_at + Duration::minutes(1));
        fx.escrows.create(&older).await.unwrap();
        fx.escrows.create(&newer).await.unwrap();

        let found = fx.matcher.find_candidate(&session).await.unwrap().unwrap();
        assert_eq!(found.id, newer.id);
    }

    #[tokio::test]
    async fn test_amount_must_match_exactly() {
        let fx = setup().await;
        let session = session_with_wallet(&fx, 50, "0xabc").await;
        fx.escrows.create(&EscrowRecord::new("dep", "0x1", "0xabc", 49)).await.unwrap();

        assert!(fx.matcher.find_candidate(&session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_link_by_reference_is_idempotent_and_conflicts() {
        let fx = setup().await;
        let session = session_with_wallet(&fx, 10, "0x2").await;
        let first = EscrowRecord::new("a", "0x1", "0x2", 10);
        let second = EscrowRecord::new("b", "0x1", "0x2", 10);
        fx.escrows.create(&first).await.unwrap();
        fx.escrows.create(&second).await.unwrap();

        fx.matcher.link_by_reference(session.id, first.id).await.unwrap();
        fx.matcher.link_by_reference(session.id, first.id).await.unwrap();

        let err = fx.matcher.link_by_reference(session.id, second.id).await.unwrap_err();
        assert!(matches!(err, DomainError::AlreadyLinked { .. }));
        assert_eq!(
            fx.matcher.linked_escrow(session.id).await.unwrap().map(|r| r.id),
            Some(first.id)
        );
    }

    #[tokio::test]
    async fn test_link_by_reference_rejects_records_that_do_not_pay_the_session() {
        let fx = setup().await;
        let session = session_with_wallet(&fx, 100, "0xRecipient").await;
        let short = EscrowRecord::new("short", "0x1", "0xrecipient", 1);
        let elsewhere = EscrowRecord::new("elsewhere", "0x1", "0xmallory", 100);
        let real = EscrowRecord::new("real", "0x1", "0xRECIPIENT", 100);
        for record in [&short, &elsewhere, &real] {
            fx.escrows.create(record).await.unwrap();
        }

        for forged in [&short, &elsewhere] {
            let err = fx.matcher.link_by_reference(session.id, forged.id).await.unwrap_err();
            assert!(matches!(err, DomainError::EscrowMismatch { .. }), "got {err:?}");
            assert!(!fx.escrows.get(forged.id).await.unwrap().unwrap().is_linked());
        }

        let linked = fx.matcher.link_by_reference(session.id, real.id).await.unwrap();
        assert_eq!(linked.session_id, Some(session.id));
    }

    #[tokio::test]
    async fn test_link_by_reference_requires_recipient_wallet() {
        let fx = setup().await;
        let session = Session::new(Uuid::new_v4(), Uuid::new_v4(), 10);
        fx.sessions.create(&session).await.unwrap();
        let record = EscrowRecord::new("a", "0x1", "0x2", 10);
        fx.escrows.create(&record).await.unwrap();

        let err = fx.matcher.link_by_reference(session.id, record.id).await.unwrap_err();
        assert!(matches!(err, DomainError::EscrowMismatch { .. }));
    }

    #[tokio::test]
    async fn test_link_by_reference_missing_records() {
        let fx = setup().await;
        let err = fx.matcher.link_by_reference(Uuid::new_v4(), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DomainError::SessionNotFound(_)));

        let session = Session::new(Uuid::new_v4(), Uuid::new_v4(), 10);
        fx.sessions.create(&session).await.unwrap();
        let err = fx.matcher.link_by_reference(session.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DomainError::EscrowNotFound(_)));
    }

    #[test]
    fn test_predicate_window_is_symmetric() {
        let session = Session::new(Uuid::new_v4(), Uuid::new_v4(), 50);
        let at = |mins: i64| {
            EscrowRecord::new("x", "0x1", "0xABC", 50).with_created_at(session.created_at + Duration::minutes(mins))
        };
        let window = Duration::minutes(5);

        assert!(is_legacy_candidate(&at(-5), &session, "0xabc", window));
        assert!(is_legacy_candidate(&at(5), &session, "0xabc", window));
        assert!(!is_legacy_candidate(&at(-6), &session, "0xabc", window));
        assert!(!is_legacy_candidate(&at(0).with_session(Uuid::new_v4()), &session, "0xabc", window));
    }
}
