//! Push log commands.

use anyhow::{Context, Result};
use cadence_config::SystemConfig;
use cadence_core::push::PushLogStore;
use cadence_db::PgPushLogStore;

/// Report whether `location` was already pushed at or after `order`.
pub async fn check(
    config: &SystemConfig,
    database_url: Option<String>,
    location: &str,
    order: i64,
) -> Result<()> {
    let pool = super::connect(&config.database, database_url).await?;
    let store = PgPushLogStore::new(pool);

    let existing = store
        .find_push_log_after(location, order)
        .await
        .context("Failed to query push log")?;

    match existing {
        Some(log) => {
            println!(
                "Skip: {} already {} by task {} (revision {}, order {})",
                location,
                log.status.as_str(),
                log.task_id,
                log.revision,
                log.order_number
            );
        }
        None => println!("Push allowed: no push of {} at order >= {}", location, order),
    }

    Ok(())
}
