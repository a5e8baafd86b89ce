//! Cadence CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Cadence task scheduler CLI", long_about = None)]
struct Cli {
    /// System configuration file (KDL)
    #[arg(long, global = true, env = "CADENCE_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL, used when the configuration does not set one
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Order a batch of tasks for dispatch
    Prioritize {
        /// JSON file holding an array of tasks
        batch: PathBuf,
        /// Use an in-memory history instead of the database
        #[arg(long)]
        dry_run: bool,
        /// JSON file of task records to seed the in-memory history (with --dry-run)
        #[arg(long, requires = "dry_run")]
        history: Option<PathBuf>,
        /// Print the order as a JSON array
        #[arg(long)]
        json: bool,
    },
    /// Validate a system configuration file
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "cadence.kdl")]
        path: PathBuf,
    },
    /// Check whether a location was already pushed from this or a newer revision
    PushCheck {
        /// Permanent location of the artifact
        location: String,
        /// Revision order number of the pushing task
        order: i64,
    },
    /// Run database migrations
    Migrate,
    /// List commits of a GitHub repository branch
    Commits {
        owner: String,
        repo: String,
        #[arg(long, default_value = "main")]
        branch: String,
        /// Maximum number of pages to fetch
        #[arg(long, default_value = "1")]
        pages: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse()).await
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Validate reads its own file, so the global config is only loaded per command
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Prioritize {
            batch,
            dry_run,
            history,
            json,
        } => {
            let config = commands::load_config(config_path)?;
            let source = if dry_run {
                commands::prioritize::HistorySource::InMemory(history)
            } else {
                commands::prioritize::HistorySource::Database(cli.database_url)
            };
            commands::prioritize::run(&config, &batch, source, json).await?;
        }
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
        Commands::PushCheck { location, order } => {
            let config = commands::load_config(config_path)?;
            commands::push::check(&config, cli.database_url, &location, order).await?;
        }
        Commands::Migrate => {
            let config = commands::load_config(config_path)?;
            commands::migrate(&config, cli.database_url).await?;
        }
        Commands::Commits {
            owner,
            repo,
            branch,
            pages,
        } => {
            let config = commands::load_config(config_path)?;
            commands::github::commits(&config, &owner, &repo, &branch, pages).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MISSING_CONFIG: &str = "/nonexistent/cadence.kdl";

    #[tokio::test]
    async fn test_validate_ignores_global_config() {
        let path = std::env::temp_dir()
            .join(format!("cadence-validate-{}.kdl", std::process::id()));
        std::fs::write(&path, "scheduler { max-concurrent-queries 4 }\n").unwrap();

        let cli = Cli::try_parse_from([
            "cadence",
            "--config",
            MISSING_CONFIG,
            "validate",
            path.to_str().unwrap(),
        ])
        .unwrap();
        let result = run(cli).await;
        std::fs::remove_file(&path).unwrap();

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_prioritize_requires_readable_config() {
        let cli = Cli::try_parse_from([
            "cadence",
            "--config",
            MISSING_CONFIG,
            "prioritize",
            "batch.json",
            "--dry-run",
        ])
        .unwrap();

        let err = run(cli).await.unwrap_err();
        assert!(err.to_string().contains("Failed to load config file"));
    }
}
