//! Prioritization errors.

use cadence_core::TaskId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrioritizeError {
    /// A metadata store query failed. The whole batch is unusable.
    #[error("{operation} failed for task {task_id}: {source}")]
    QueryFailure {
        operation: &'static str,
        task_id: TaskId,
        #[source]
        source: cadence_core::Error,
    },

    #[error("task {task_id} depends on unknown task {dependency}")]
    DanglingDependency { task_id: TaskId, dependency: TaskId },

    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    #[error("prioritization cancelled")]
    Cancelled,
}

pub type PrioritizeResult<T> = std::result::Result<T, PrioritizeError>;
