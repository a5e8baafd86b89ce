//! CLI command implementations.

pub mod github;
pub mod prioritize;
pub mod push;

use anyhow::{Context, Result};
use cadence_config::{DatabaseConfig, SystemConfig, load_system_config};
use cadence_db::PgPool;
use std::path::Path;

/// Load the system configuration, or defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<SystemConfig> {
    match path {
        Some(path) => load_system_config(path)
            .with_context(|| format!("Failed to load config file: {}", path.display())),
        None => Ok(SystemConfig::default()),
    }
}

pub fn validate(path: &Path) -> Result<()> {
    match load_system_config(path) {
        Ok(config) => {
            println!("Configuration is valid");
            println!(
                "  max concurrent queries: {}",
                config.scheduler.max_concurrent_queries
            );
            let criteria: Vec<String> = config
                .scheduler
                .criteria
                .iter()
                .map(ToString::to_string)
                .collect();
            println!("  ranking criteria: {}", criteria.join(", "));
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

pub async fn migrate(config: &SystemConfig, database_url: Option<String>) -> Result<()> {
    let pool = connect(&config.database, database_url).await?;
    cadence_db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;
    println!("Migrations applied");
    Ok(())
}

/// Connect using the configured URL, falling back to the command line / environment.
pub async fn connect(config: &DatabaseConfig, fallback_url: Option<String>) -> Result<PgPool> {
    let url = config
        .url
        .clone()
        .or(fallback_url)
        .context("No database URL: set `database url=...` in the config or DATABASE_URL")?;

    cadence_db::create_pool(&url, config)
        .await
        .context("Failed to connect to database")
}
