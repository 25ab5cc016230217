//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that infrastructure adapters must implement:
//! - SessionRepository, EscrowRepository, SummonRepository, MessageRepository: durable store
//! - WalletResolver: identity to on-chain address lookup
//! - NotificationSink: fire-and-forget notification delivery
//! - BroadcastChannel: per-session publish/subscribe of durable log changes
//! - MessageLog: the durable log as consumed by the client-side reconciler
//!
//! These traits keep the domain independent of specific infrastructure implementations.

pub mod broadcast;
pub mod escrow_repository;
pub mod message_log;
pub mod message_repository;
pub mod notification_sink;
pub mod session_repository;
pub mod summon_repository;
pub mod wallet_resolver;

pub use broadcast::{BroadcastChannel, Delivery, Subscription};
pub use escrow_repository::{EscrowRepository, LinkOutcome};
pub use message_log::MessageLog;
pub use message_repository::MessageRepository;
pub use notification_sink::NotificationSink;
pub use session_repository::SessionRepository;
pub use summon_repository::SummonRepository;
pub use wallet_resolver::WalletResolver;
