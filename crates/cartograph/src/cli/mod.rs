//! CLI command handlers.

pub mod catalog;
pub mod job;
pub mod procedure;
pub mod serve;

use anyhow::{Context, Result};

use cartograph_db::{init_schema, DbConfig, DbPool};
use cartograph_protocol::SystemConfig;

/// Open the configured database and make sure the schema exists.
pub async fn connect(config: &SystemConfig) -> Result<DbPool> {
    let pool = DbConfig::from_url(&config.database_url)
        .context("Invalid database URL")?
        .connect()
        .await
        .context("Failed to open database")?;
    init_schema(&pool).await.context("Schema bootstrap failed")?;
    Ok(pool)
}
