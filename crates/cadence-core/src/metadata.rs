//! Metadata store abstraction.
//!
//! The prioritizer reads task history through this trait. Implementations must
//! be safe to call concurrently; each call is independent of every other.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use crate::{Requester, Result, TaskId, TaskRecord};

/// Identifies the family of tasks that share a display name within one
/// revision of a project, minus the variant being evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimilarTaskQuery<'a> {
    pub project: &'a str,
    pub revision: &'a str,
    pub requester: Requester,
    pub display_name: &'a str,
    /// Variant of the task under evaluation; never counted.
    pub excluding_variant: &'a str,
}

/// Read-only queries over task history.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Most recent completed automated task with the same project, variant and
    /// display name whose order number is strictly below `before_order`.
    async fn find_latest_completed(
        &self,
        project: &str,
        build_variant: &str,
        display_name: &str,
        before_order: i64,
    ) -> Result<Option<TaskRecord>>;

    /// Number of distinct other variants whose latest matching task failed.
    async fn count_failing_variants(&self, query: SimilarTaskQuery<'_>) -> Result<usize>;

    /// Subset of `ids` that exist in the store.
    async fn existing_task_ids(&self, ids: &[TaskId]) -> Result<HashSet<TaskId>>;
}

/// In-memory metadata store.
///
/// Used for dry runs and tests. Records are loaded up front and never change
/// while the store is shared.
#[derive(Debug, Default, Clone)]
pub struct InMemoryMetadataStore {
    records: Vec<TaskRecord>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = TaskRecord>) -> Self {
        Self {
            records: records.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn find_latest_completed(
        &self,
        project: &str,
        build_variant: &str,
        display_name: &str,
        before_order: i64,
    ) -> Result<Option<TaskRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| {
                r.project == project
                    && r.build_variant == build_variant
                    && r.display_name == display_name
                    && r.requester.is_automated()
                    && r.status.is_completed()
                    && r.order_number < before_order
            })
            .max_by(|a, b| {
                a.order_number
                    .cmp(&b.order_number)
                    .then_with(|| a.finished_at.cmp(&b.finished_at))
            })
            .cloned())
    }

    async fn count_failing_variants(&self, query: SimilarTaskQuery<'_>) -> Result<usize> {
        // Latest execution per variant
        let mut latest: HashMap<&str, &TaskRecord> = HashMap::new();
        for record in self.records.iter().filter(|r| {
            r.project == query.project
                && r.revision == query.revision
                && r.requester == query.requester
                && r.display_name == query.display_name
                && r.build_variant != query.excluding_variant
        }) {
            latest
                .entry(record.build_variant.as_str())
                .and_modify(|current| {
                    if record.finished_at > current.finished_at {
                        *current = record;
                    }
                })
                .or_insert(record);
        }

        Ok(latest.values().filter(|r| r.is_failed()).count())
    }

    async fn existing_task_ids(&self, ids: &[TaskId]) -> Result<HashSet<TaskId>> {
        let wanted: HashSet<&TaskId> = ids.iter().collect();
        Ok(self
            .records
            .iter()
            .filter(|r| wanted.contains(&r.id))
            .map(|r| r.id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaskStatus;
    use chrono::{TimeZone, Utc};

    fn record(id: &str, variant: &str, order: i64, status: TaskStatus) -> TaskRecord {
        TaskRecord {
            id: TaskId::from(id),
            project: "mongodb".to_string(),
            build_variant: variant.to_string(),
            display_name: "compile".to_string(),
            requester: Requester::Revision,
            revision: format!("rev{}", order),
            order_number: order,
            status,
            finished_at: None,
        }
    }

    #[tokio::test]
    async fn test_find_latest_completed_is_strictly_before() {
        let store = InMemoryMetadataStore::with_records(vec![
            record("a", "linux", 3, TaskStatus::Success),
            record("b", "linux", 5, TaskStatus::Failed),
            record("c", "linux", 7, TaskStatus::Success),
            record("d", "linux", 6, TaskStatus::Started),
            record("e", "osx", 6, TaskStatus::Success),
        ]);

        let prev = store
            .find_latest_completed("mongodb", "linux", "compile", 7)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prev.id, TaskId::from("b"));

        let none = store
            .find_latest_completed("mongodb", "linux", "compile", 3)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_count_failing_variants_uses_latest_execution() {
        let mut old_failure = record("w1", "windows", 9, TaskStatus::Failed);
        old_failure.finished_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let mut retried = record("w2", "windows", 9, TaskStatus::Success);
        retried.finished_at = Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());

        let store = InMemoryMetadataStore::with_records(vec![
            record("l", "linux", 9, TaskStatus::Failed),
            record("o", "osx", 9, TaskStatus::Failed),
            record("s", "solaris", 9, TaskStatus::Success),
            old_failure,
            retried,
        ]);

        let count = store
            .count_failing_variants(SimilarTaskQuery {
                project: "mongodb",
                revision: "rev9",
                requester: Requester::Revision,
                display_name: "compile",
                excluding_variant: "linux",
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_existing_task_ids() {
        let store =
            InMemoryMetadataStore::with_records(vec![record("a", "linux", 1, TaskStatus::Success)]);
        let found = store
            .existing_task_ids(&[TaskId::from("a"), TaskId::from("zzz")])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains(&TaskId::from("a")));
    }
}
