//! Application services.

pub mod escrow_matcher;
pub mod message_reconciler;
pub mod message_service;
pub mod pledge_ledger;
pub mod session_service;

pub use escrow_matcher::{EscrowMatcher, LegacyDepositRule, LinkedReferenceRule, MatchRule};
pub use message_reconciler::{MessageEntry, MessageStream, MessageView, StreamMode};
pub use message_service::MessageService;
pub use pledge_ledger::PledgeLedger;
pub use session_service::SessionService;

use crate::domain::models::Notification;
use crate::domain::ports::NotificationSink;

/// Dispatch a notification without letting a failure reach the caller.
pub(crate) async fn notify_best_effort(sink: &dyn NotificationSink, notification: Notification) {
    let kind = notification.kind.as_str();
    let target = notification.target_user;
    if let Err(e) = sink.notify(notification).await {
        tracing::warn!(kind, target_user = %target, error = %e, "notification dispatch failed");
    }
}
