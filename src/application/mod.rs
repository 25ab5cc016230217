//! Application wiring: lifetime-scoped handles and background jobs.

pub mod context;
pub mod expiry_sweeper;

pub use context::AppContext;
pub use expiry_sweeper::ExpirySweeper;
