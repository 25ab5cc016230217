//! SQLite wallet registry backing the WalletResolver port.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{normalize_address, Wallet};
use crate::domain::ports::WalletResolver;

#[derive(Clone)]
pub struct SqliteWalletRepository {
    pool: SqlitePool,
}

impl SqliteWalletRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WalletResolver for SqliteWalletRepository {
    async fn primary_address(&self, user_id: Uuid) -> DomainResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"SELECT address FROM wallets WHERE user_id = ?
               ORDER BY is_primary DESC, created_at ASC, rowid ASC
               LIMIT 1"#
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(address,)| address))
    }

    async fn register(&self, wallet: &Wallet) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        // A new primary wallet demotes the previous one
        if wallet.is_primary {
            sqlx::query("UPDATE wallets SET is_primary = 0 WHERE user_id = ?")
                .bind(wallet.user_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"INSERT INTO wallets (user_id, address, is_primary, created_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT (user_id, address) DO UPDATE SET is_primary = excluded.is_primary"#
        )
        .bind(wallet.user_id.to_string())
        .bind(normalize_address(&wallet.address))
        .bind(wallet.is_primary)
        .bind(wallet.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn setup_test_repo() -> SqliteWalletRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteWalletRepository::new(pool)
    }

    #[tokio::test]
    async fn test_no_wallet_resolves_to_none() {
        let repo = setup_test_repo().await;
        assert!(repo.primary_address(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_first_registered_wins_without_primary() {
        let repo = setup_test_repo().await;
        let user = Uuid::new_v4();
        repo.register(&Wallet::new(user, "0xFIRST", false)).await.unwrap();
        repo.register(&Wallet::new(user, "0xSECOND", false)).await.unwrap();

        assert_eq!(repo.primary_address(user).await.unwrap().as_deref(), Some("0xfirst"));
    }

    #[tokio::test]
    async fn test_primary_wallet_preferred() {
        let repo = setup_test_repo().await;
        let user = Uuid::new_v4();
        repo.register(&Wallet::new(user, "0xFIRST", false)).await.unwrap();
        repo.register(&Wallet::new(user, "0xMAIN", true)).await.unwrap();
        assert_eq!(repo.primary_address(user).await.unwrap().as_deref(), Some("0xmain"));

        repo.register(&Wallet::new(user, "0xNEWMAIN", true)).await.unwrap();
        assert_eq!(repo.primary_address(user).await.unwrap().as_deref(), Some("0xnewmain"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_primary_registrations_leave_one_primary() {
        use crate::adapters::sqlite::{open, Migrator};
        use crate::domain::models::DatabaseConfig;

        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("wallets.db").display().to_string(),
            max_connections: 8,
        };
        let pool = open(&config).await.unwrap();
        Migrator::new(pool.clone()).migrate().await.unwrap();
        let repo = SqliteWalletRepository::new(pool.clone());
        let user = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.register(&Wallet::new(user, &format!("0x{i}"), true)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let (primaries,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM wallets WHERE user_id = ? AND is_primary = 1")
                .bind(user.to_string())
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(primaries, 1);
        pool.close().await;
    }
}
