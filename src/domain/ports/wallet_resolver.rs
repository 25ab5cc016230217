//! Identity/wallet resolver port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Wallet;

#[async_trait]
pub trait WalletResolver: Send + Sync {
    /// The user's primary on-chain address, or their first registered
    /// address when none is marked primary.
    async fn primary_address(&self, user_id: Uuid) -> DomainResult<Option<String>>;

    /// Register an address for a user.
    async fn register(&self, wallet: &Wallet) -> DomainResult<()>;
}
