//! Task definitions.
//!
//! A task is the smallest schedulable unit of build/test work within the
//! evaluation of one version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TaskId;

/// What caused a task to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requester {
    /// Automated evaluation of a tracked revision.
    Revision,
    /// Manual or patch submission.
    Patch,
}

impl Requester {
    /// History-based signals are only defined for automated revisions.
    pub fn is_automated(&self) -> bool {
        matches!(self, Requester::Revision)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Requester::Revision => "revision",
            Requester::Patch => "patch",
        }
    }
}

impl std::fmt::Display for Requester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Requester {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "revision" => Ok(Requester::Revision),
            "patch" => Ok(Requester::Patch),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown requester: {}",
                other
            ))),
        }
    }
}

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created but not yet handed to a host.
    Undispatched,
    /// Assigned to a host.
    Dispatched,
    /// Running on a host.
    Started,
    /// Completed successfully.
    Success,
    /// Completed with a failure.
    Failed,
    /// Aborted before completion.
    Cancelled,
}

impl TaskStatus {
    /// Whether the task finished running (successfully or not).
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Undispatched => "undispatched",
            TaskStatus::Dispatched => "dispatched",
            TaskStatus::Started => "started",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "undispatched" => Ok(TaskStatus::Undispatched),
            "dispatched" => Ok(TaskStatus::Dispatched),
            "started" => Ok(TaskStatus::Started),
            "success" => Ok(TaskStatus::Success),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown task status: {}",
                other
            ))),
        }
    }
}

/// A dependency on another task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// The task that must finish first.
    pub task_id: TaskId,
    /// Status the dependency has to finish with.
    #[serde(default = "default_dependency_status")]
    pub status: TaskStatus,
}

fn default_dependency_status() -> TaskStatus {
    TaskStatus::Success
}

impl Dependency {
    pub fn on(task_id: impl Into<TaskId>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Success,
        }
    }
}

/// A schedulable task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub id: TaskId,
    /// Project the task belongs to.
    pub project: String,
    /// Build variant (platform/configuration) the task runs on.
    pub build_variant: String,
    /// Name shared by the same task across variants and revisions.
    pub display_name: String,
    /// What created this task.
    pub requester: Requester,
    /// Revision identifier (commit hash) of the task's version.
    pub revision: String,
    /// Per-project revision sequence number, inherited from the version.
    pub order_number: i64,
    /// Tasks this one waits on.
    #[serde(default)]
    pub depends_on: Vec<Dependency>,
    /// Configured priority; higher runs sooner.
    #[serde(default)]
    pub priority: i64,
    /// Current status.
    pub status: TaskStatus,
}

/// Summary of a historical task execution as returned by the metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub project: String,
    pub build_variant: String,
    pub display_name: String,
    pub requester: Requester,
    pub revision: String,
    pub order_number: i64,
    pub status: TaskStatus,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }
}

impl From<&Task> for TaskRecord {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            project: task.project.clone(),
            build_variant: task.build_variant.clone(),
            display_name: task.display_name.clone(),
            requester: task.requester,
            revision: task.revision.clone(),
            order_number: task.order_number,
            status: task.status,
            finished_at: None,
        }
    }
}
