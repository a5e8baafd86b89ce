//! PostgreSQL storage for Cadence.
//!
//! Provides the metadata and push log stores plus pool setup and migrations.

pub mod error;
pub mod metadata;
pub mod push;
pub mod schema;

pub use error::{DbError, DbResult};
pub use metadata::PgMetadataStore;
pub use push::PgPushLogStore;

use cadence_config::DatabaseConfig;
pub use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::info;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str, config: &DatabaseConfig) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await?;
    info!(max_connections = config.max_connections, "Connected to database");
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
