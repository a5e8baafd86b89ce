//! Per-batch signal population.
//!
//! Each `populate_*` function produces its own map and shares nothing with the
//! others, so the three can run concurrently and be merged at a barrier.

use cadence_core::metadata::{MetadataStore, SimilarTaskQuery};
use cadence_core::{Task, TaskId, TaskRecord};
use futures::{StreamExt, TryStreamExt, stream};
use std::collections::HashMap;

use crate::{PrioritizeError, PrioritizeResult};

pub const PREVIOUS_COMPLETION: &str = "populate_previous_completion";
pub const SIMILAR_FAILURES: &str = "populate_similar_failures";

/// Signals for one batch, keyed by task id.
///
/// Only built from fully populated maps. Lookups that miss return the neutral
/// value (no record, zero count).
#[derive(Debug, Default, Clone)]
pub struct SignalCache {
    previous: HashMap<TaskId, Option<TaskRecord>>,
    dependency_count: HashMap<TaskId, usize>,
    similar_failures: HashMap<TaskId, usize>,
}

impl SignalCache {
    pub fn new(
        previous: HashMap<TaskId, Option<TaskRecord>>,
        dependency_count: HashMap<TaskId, usize>,
        similar_failures: HashMap<TaskId, usize>,
    ) -> Self {
        Self {
            previous,
            dependency_count,
            similar_failures,
        }
    }

    /// Most recent completed predecessor of the task, if any.
    pub fn previous_completion(&self, id: &TaskId) -> Option<&TaskRecord> {
        self.previous.get(id).and_then(Option::as_ref)
    }

    /// Whether the predecessor run failed.
    pub fn previous_failed(&self, id: &TaskId) -> bool {
        self.previous_completion(id)
            .map(TaskRecord::is_failed)
            .unwrap_or(false)
    }

    pub fn dependency_count(&self, id: &TaskId) -> usize {
        self.dependency_count.get(id).copied().unwrap_or(0)
    }

    pub fn similar_failures(&self, id: &TaskId) -> usize {
        self.similar_failures.get(id).copied().unwrap_or(0)
    }
}

/// Look up the previous completed run of every automated task.
///
/// Patch tasks map to `None` without a query.
pub async fn populate_previous_completion(
    store: &dyn MetadataStore,
    tasks: &[Task],
    max_concurrent: usize,
) -> PrioritizeResult<HashMap<TaskId, Option<TaskRecord>>> {
    stream::iter(tasks)
        .map(|task| async move {
            if !task.requester.is_automated() {
                return Ok((task.id.clone(), None));
            }

            store
                .find_latest_completed(
                    &task.project,
                    &task.build_variant,
                    &task.display_name,
                    task.order_number,
                )
                .await
                .map(|previous| (task.id.clone(), previous))
                .map_err(|source| PrioritizeError::QueryFailure {
                    operation: PREVIOUS_COMPLETION,
                    task_id: task.id.clone(),
                    source,
                })
        })
        .buffer_unordered(max_concurrent.max(1))
        .try_collect()
        .await
}

/// Count, for every task id, how many dependency edges in the batch point at it.
///
/// Pure computation over the batch. Tasks nobody depends on are absent.
pub fn populate_dependency_count(tasks: &[Task]) -> HashMap<TaskId, usize> {
    let mut counts: HashMap<TaskId, usize> = HashMap::new();
    for task in tasks {
        for dependency in &task.depends_on {
            *counts.entry(dependency.task_id.clone()).or_default() += 1;
        }
    }
    counts
}

/// Count failing sibling variants for every automated task.
///
/// Patch tasks map to zero without a query.
pub async fn populate_similar_failures(
    store: &dyn MetadataStore,
    tasks: &[Task],
    max_concurrent: usize,
) -> PrioritizeResult<HashMap<TaskId, usize>> {
    stream::iter(tasks)
        .map(|task| async move {
            if !task.requester.is_automated() {
                return Ok((task.id.clone(), 0));
            }

            let query = SimilarTaskQuery {
                project: &task.project,
                revision: &task.revision,
                requester: task.requester,
                display_name: &task.display_name,
                excluding_variant: &task.build_variant,
            };
            store
                .count_failing_variants(query)
                .await
                .map(|count| (task.id.clone(), count))
                .map_err(|source| PrioritizeError::QueryFailure {
                    operation: SIMILAR_FAILURES,
                    task_id: task.id.clone(),
                    source,
                })
        })
        .buffer_unordered(max_concurrent.max(1))
        .try_collect()
        .await
}
