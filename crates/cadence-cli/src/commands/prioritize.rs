//! Batch prioritization command.

use anyhow::{Context, Result};
use cadence_config::SystemConfig;
use cadence_core::metadata::{InMemoryMetadataStore, MetadataStore};
use cadence_core::{Task, TaskRecord};
use cadence_db::PgMetadataStore;
use cadence_scheduler::Prioritizer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Where task history comes from.
pub enum HistorySource {
    /// In-memory store, optionally seeded from a JSON file of task records.
    InMemory(Option<PathBuf>),
    /// PostgreSQL, with an optional URL fallback.
    Database(Option<String>),
}

pub async fn run(
    config: &SystemConfig,
    batch_path: &Path,
    source: HistorySource,
    json: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(batch_path)
        .with_context(|| format!("Failed to read batch file: {}", batch_path.display()))?;
    let tasks = parse_batch(&content)
        .with_context(|| format!("Failed to parse batch file: {}", batch_path.display()))?;

    let store: Arc<dyn MetadataStore> = match source {
        HistorySource::InMemory(history) => Arc::new(load_history(history.as_deref())?),
        HistorySource::Database(url) => {
            let pool = super::connect(&config.database, url).await?;
            Arc::new(PgMetadataStore::new(pool))
        }
    };

    let prioritizer = Prioritizer::new(store, &config.scheduler);
    let criteria: Vec<String> = prioritizer
        .ranker()
        .criteria()
        .iter()
        .map(ToString::to_string)
        .collect();
    info!(tasks = tasks.len(), criteria = %criteria.join(","), "Prioritizing batch");

    // Abandon the round on Ctrl-C
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling prioritization");
            on_interrupt.cancel();
        }
    });

    let order = prioritizer
        .prioritize_with_cancel(&tasks, &cancel)
        .await
        .context("Prioritization failed")?;

    info!(tasks = order.len(), "Batch prioritized");
    if json {
        println!("{}", serde_json::to_string_pretty(&order)?);
    } else {
        for id in &order {
            println!("{}", id);
        }
    }

    Ok(())
}

fn parse_batch(content: &str) -> Result<Vec<Task>> {
    let tasks: Vec<Task> = serde_json::from_str(content)?;
    Ok(tasks)
}

fn load_history(path: Option<&Path>) -> Result<InMemoryMetadataStore> {
    let Some(path) = path else {
        return Ok(InMemoryMetadataStore::new());
    };

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file: {}", path.display()))?;
    let records: Vec<TaskRecord> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse history file: {}", path.display()))?;

    let store = InMemoryMetadataStore::with_records(records);
    info!(records = store.len(), "Loaded in-memory history");
    Ok(store)
}
