//! Database pool creation with compile-time backend selection.
//!
//! Unlike `sqlx::AnyPool`, we use concrete pool types which allows full
//! support for `#[derive(FromRow)]` with `DateTime<Utc>` and JSON columns.
//!
//! - `postgres` feature: uses `PgPool`
//! - `sqlite` feature (default): uses `SqlitePool`
//!
//! If both features are enabled, `postgres` takes priority.

use thiserror::Error;
use tracing::info;

/// Pool construction errors.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),

    #[error("Database type {0} not compiled in. Rebuild with the '{1}' feature.")]
    NotCompiled(String, String),
}

/// Database driver type selected by feature flags.
#[cfg(all(feature = "postgres", not(feature = "sqlite")))]
pub type Db = sqlx::Postgres;

#[cfg(feature = "sqlite")]
pub type Db = sqlx::Sqlite;

/// Database pool type alias selected by feature flags.
#[cfg(all(feature = "postgres", not(feature = "sqlite")))]
pub type DbPool = sqlx::PgPool;

#[cfg(feature = "sqlite")]
pub type DbPool = sqlx::SqlitePool;

/// Database row type for queries.
#[cfg(all(feature = "postgres", not(feature = "sqlite")))]
pub type DbRow = sqlx::postgres::PgRow;

#[cfg(feature = "sqlite")]
pub type DbRow = sqlx::sqlite::SqliteRow;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum connections in the pool
    pub max_connections: u32,
}

impl DbConfig {
    /// Create SQLite configuration for a file path.
    #[cfg(feature = "sqlite")]
    pub fn sqlite(path: impl AsRef<str>) -> Self {
        Self {
            url: format!("sqlite:{}?mode=rwc", path.as_ref()),
            max_connections: 5,
        }
    }

    /// Create in-memory SQLite configuration (for testing).
    ///
    /// Capped at one connection so every handle sees the same database.
    #[cfg(feature = "sqlite")]
    pub fn sqlite_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }

    /// Create configuration from an explicit URL.
    pub fn from_url(url: impl Into<String>) -> Result<Self, PoolError> {
        let url = url.into();
        let max_connections = if url.starts_with("sqlite:") {
            5
        } else if url.starts_with("postgres:") || url.starts_with("postgresql:") {
            10
        } else {
            return Err(PoolError::InvalidUrl(url));
        };
        Ok(Self {
            url,
            max_connections,
        })
    }

    /// Connect and build the pool.
    pub async fn connect(&self) -> Result<DbPool, PoolError> {
        #[cfg(all(feature = "postgres", not(feature = "sqlite")))]
        if self.url.starts_with("sqlite:") {
            return Err(PoolError::NotCompiled(
                "SQLite".to_string(),
                "sqlite".to_string(),
            ));
        }
        #[cfg(feature = "sqlite")]
        if self.url.starts_with("postgres:") || self.url.starts_with("postgresql:") {
            return Err(PoolError::NotCompiled(
                "PostgreSQL".to_string(),
                "postgres".to_string(),
            ));
        }

        let pool = pool_options()
            .max_connections(self.max_connections)
            .connect(&self.url)
            .await?;
        info!(url = %self.url, "Database pool ready");
        Ok(pool)
    }
}

#[cfg(all(feature = "postgres", not(feature = "sqlite")))]
fn pool_options() -> sqlx::postgres::PgPoolOptions {
    sqlx::postgres::PgPoolOptions::new()
}

#[cfg(feature = "sqlite")]
fn pool_options() -> sqlx::sqlite::SqlitePoolOptions {
    sqlx::sqlite::SqlitePoolOptions::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_url_rejects_unknown_scheme() {
        assert!(DbConfig::from_url("mysql://nope").is_err());
    }

    #[tokio::test]
    async fn memory_config_connects() {
        let pool = DbConfig::sqlite_memory().connect().await.unwrap();
        let one: (i64,) = sqlx::query_as("SELECT 1").fetch_one(&pool).await.unwrap();
        assert_eq!(one.0, 1);
    }
}
