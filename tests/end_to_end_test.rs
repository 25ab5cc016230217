//! Full flow: a paid session is requested, backed by an escrow deposit,
//! accepted, and then used for messaging.

mod common;

use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use parley::domain::models::{EscrowRecord, EscrowStatus, NotificationKind, SessionStatus};
use parley::domain::ports::EscrowRepository;
use parley::services::StreamMode;
use parley::{DomainError, MessageStream};
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

#[tokio::test]
async fn test_session_lifecycle_with_linked_escrow_and_messages() {
    common::setup_test_logging();
    let ctx = common::context().await;
    let initiator = Uuid::new_v4();
    let recipient = Uuid::new_v4();

    let session = ctx.sessions.initiate(initiator, recipient, 100).await.unwrap();
    assert_eq!(session.status, SessionStatus::Pending);

    common::register_wallet(&ctx, recipient, "0xRecipient").await;
    let deposit = EscrowRecord::new("tx-e2e", "0xInitiator", "0xRecipient", 100).with_session(session.id);
    let stored = ctx.sessions.record_escrow(deposit).await.unwrap();
    assert_eq!(stored.session_id, Some(session.id));

    // Messaging is closed until the recipient accepts
    let err = assert_err!(ctx.messages.post(session.id, initiator, "hello?").await);
    assert!(matches!(err, DomainError::SessionNotActive(_)));

    let accepted = ctx.sessions.accept(session.id, recipient).await.unwrap();
    assert_eq!(accepted.status, SessionStatus::Active);

    let escrow = ctx.escrows.get(stored.id).await.unwrap().unwrap();
    assert_eq!(escrow.status, EscrowStatus::Accepted);
    let seen = ctx.sessions.escrow_for(session.id, initiator).await.unwrap().unwrap();
    assert_eq!(seen.id, stored.id);

    let mut stream = MessageStream::connect(
        session.id,
        initiator,
        ctx.message_log(),
        ctx.broadcast(),
        StdDuration::from_millis(20),
    )
    .await
    .unwrap();
    assert_eq!(stream.mode(), StreamMode::Live);
    assert!(stream.view().is_empty());

    let sent = assert_ok!(stream.send("hi there").await);
    assert_eq!(stream.view().len(), 1);
    assert_eq!(stream.view().pending_count(), 0);

    // The echo of our own insert arrives afterwards and must not duplicate
    tokio::time::timeout(StdDuration::from_secs(1), stream.next_update())
        .await
        .expect("echo should arrive")
        .unwrap();
    let ids: Vec<Uuid> = stream.view().messages().map(|m| m.id).collect();
    assert_eq!(ids, vec![sent.id]);

    let inbox = ctx.notifications.list_for_user(recipient).await.unwrap();
    let kinds: Vec<NotificationKind> = inbox.iter().map(|n| n.kind).collect();
    assert_eq!(kinds, vec![NotificationKind::SessionRequested, NotificationKind::NewMessage]);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_legacy_deposit_is_found_and_accepted() {
    let ctx = common::context().await;
    let initiator = Uuid::new_v4();
    let recipient = Uuid::new_v4();
    common::register_wallet(&ctx, recipient, "0xAbCdEf").await;

    let session = ctx.sessions.initiate(initiator, recipient, 250).await.unwrap();
    let record = common::deposit("0xPayer", "0xabcdef", 250, session.created_at + Duration::minutes(2));
    ctx.escrows.create(&record).await.unwrap();

    ctx.sessions.accept(session.id, recipient).await.unwrap();

    let escrow = ctx.escrows.get(record.id).await.unwrap().unwrap();
    assert_eq!(escrow.session_id, Some(session.id));
    assert_eq!(escrow.status, EscrowStatus::Accepted);
}

#[tokio::test]
async fn test_stream_observes_counterpart_messages_and_reads() {
    let ctx = common::context().await;
    let session = common::active_session(&ctx, 10).await;

    let mut stream = MessageStream::connect(
        session.id,
        session.recipient_id,
        ctx.message_log(),
        ctx.broadcast(),
        StdDuration::from_millis(20),
    )
    .await
    .unwrap();

    let posted = ctx.messages.post(session.id, session.initiator_id, "ping").await.unwrap();
    assert!(stream.next_update().await.unwrap());
    assert_eq!(stream.view().messages().next().map(|m| m.id), Some(posted.id));

    ctx.messages.mark_read(posted.id, session.recipient_id).await.unwrap();
    assert!(stream.next_update().await.unwrap());
    assert!(stream.view().messages().all(|m| m.is_read));
}

#[tokio::test]
async fn test_stale_pending_sessions_expire() {
    let ctx = common::context().await;
    let session = ctx.sessions.initiate(Uuid::new_v4(), Uuid::new_v4(), 10).await.unwrap();

    let expired = ctx.sessions.expire_pending(Utc::now() + Duration::seconds(1)).await.unwrap();
    assert_eq!(expired, 1);

    let err = ctx.sessions.accept(session.id, session.recipient_id).await.unwrap_err();
    assert!(matches!(err, DomainError::NotPending { status: SessionStatus::Cancelled, .. }));
}
