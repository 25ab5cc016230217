//! `parley migrate`: bring the configured database up to date.

use anyhow::{Context, Result};

use crate::adapters::sqlite::{open, ping, Migrator};
use crate::domain::models::Config;

pub async fn execute(config: Config) -> Result<()> {
    let pool = open(&config.database)
        .await
        .with_context(|| format!("Failed to open database at {}", config.database.path))?;
    ping(&pool).await?;

    let migrator = Migrator::new(pool.clone());
    let before = migrator.current_version().await?;
    let applied = migrator.migrate().await.context("Failed to apply migrations")?;
    let after = migrator.current_version().await?;
    pool.close().await;

    if applied == 0 {
        println!("Schema already at version {after}");
    } else {
        println!("Applied {applied} migration(s): version {before} -> {after}");
    }
    Ok(())
}
