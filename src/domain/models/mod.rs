pub mod config;
pub mod escrow;
pub mod message;
pub mod notification;
pub mod session;
pub mod summon;

pub use config::{
    Config, DatabaseConfig, EscrowConfig, LogFormat, LoggingConfig, MessagingConfig, PledgeConfig,
    RotationPolicy, ServerConfig, SessionConfig,
};
pub use escrow::{normalize_address, EscrowRecord, EscrowStatus, Wallet};
pub use message::{ChangeEvent, ChangeKind, DedupKey, Message};
pub use notification::{Notification, NotificationKind};
pub use session::{Session, SessionStatus};
pub use summon::{BackerEntry, BackerStats, Summon, SummonTarget};
