//! Push log: bookkeeping for artifacts published by push tasks.
//!
//! Before publishing a file, a push task checks whether the same location has
//! already been pushed (or is being pushed) from its own or a newer revision,
//! so an older build never overwrites a newer artifact.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, ResourceId, Result, Task, TaskId, Version};

/// State of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushStatus {
    Pushing,
    Success,
    Failed,
}

impl PushStatus {
    /// Pushes that block another push to the same location.
    pub fn is_live(&self) -> bool {
        matches!(self, PushStatus::Pushing | PushStatus::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PushStatus::Pushing => "pushing",
            PushStatus::Success => "success",
            PushStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for PushStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pushing" => Ok(PushStatus::Pushing),
            "success" => Ok(PushStatus::Success),
            "failed" => Ok(PushStatus::Failed),
            other => Err(Error::InvalidInput(format!("unknown push status: {}", other))),
        }
    }
}

/// A recorded push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushLog {
    pub id: ResourceId,
    /// Permanent location of the pushed file.
    pub location: String,
    /// Task that performed the push.
    pub task_id: TaskId,
    pub created_at: DateTime<Utc>,
    pub revision: String,
    /// Copied from the task's version.
    pub order_number: i64,
    pub status: PushStatus,
}

impl PushLog {
    /// Start a push of `location` by `task` for `version`.
    pub fn new(version: &Version, task: &Task, location: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(),
            location: location.into(),
            task_id: task.id.clone(),
            created_at: Utc::now(),
            revision: version.revision.clone(),
            order_number: version.order_number,
            status: PushStatus::Pushing,
        }
    }

    /// Whether this push supersedes a push of the same location at `order_number`.
    pub fn blocks(&self, location: &str, order_number: i64) -> bool {
        self.location == location && self.order_number >= order_number && self.status.is_live()
    }
}

/// Storage for push logs.
#[async_trait]
pub trait PushLogStore: Send + Sync {
    async fn insert(&self, log: &PushLog) -> Result<()>;

    async fn update_status(&self, id: ResourceId, status: PushStatus) -> Result<()>;

    /// Newest live push of `location` at or after `order_number`, if any.
    async fn find_push_log_after(
        &self,
        location: &str,
        order_number: i64,
    ) -> Result<Option<PushLog>>;
}
