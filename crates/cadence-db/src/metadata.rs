//! Task history backed by the `tasks` table.

use async_trait::async_trait;
use cadence_core::metadata::{MetadataStore, SimilarTaskQuery};
use cadence_core::{Requester, TaskId, TaskRecord};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashSet;
use tracing::debug;

use crate::schema::{COUNT_FAILING_VARIANTS, EXISTING_TASK_IDS, FIND_LATEST_COMPLETED};
use crate::{DbError, DbResult};

/// Database row for tasks.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: String,
    pub project: String,
    pub build_variant: String,
    pub display_name: String,
    pub requester: String,
    pub revision: String,
    pub order_number: i64,
    pub status: String,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<TaskRow> for TaskRecord {
    type Error = DbError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let requester = row
            .requester
            .parse()
            .map_err(|_| DbError::InvalidData(format!("Unknown requester: {}", row.requester)))?;
        let status = row
            .status
            .parse()
            .map_err(|_| DbError::InvalidData(format!("Unknown task status: {}", row.status)))?;

        Ok(TaskRecord {
            id: TaskId::new(row.id),
            project: row.project,
            build_variant: row.build_variant,
            display_name: row.display_name,
            requester,
            revision: row.revision,
            order_number: row.order_number,
            status,
            finished_at: row.finished_at,
        })
    }
}

/// PostgreSQL implementation.
#[derive(Clone)]
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn latest_completed(
        &self,
        project: &str,
        build_variant: &str,
        display_name: &str,
        before_order: i64,
    ) -> DbResult<Option<TaskRecord>> {
        let row = sqlx::query_as::<_, TaskRow>(FIND_LATEST_COMPLETED)
            .bind(project)
            .bind(build_variant)
            .bind(display_name)
            .bind(Requester::Revision.as_str())
            .bind(before_order)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TaskRecord::try_from).transpose()
    }

    async fn failing_variants(&self, query: SimilarTaskQuery<'_>) -> DbResult<usize> {
        let count: i64 = sqlx::query_scalar(COUNT_FAILING_VARIANTS)
            .bind(query.project)
            .bind(query.revision)
            .bind(query.requester.as_str())
            .bind(query.display_name)
            .bind(query.excluding_variant)
            .fetch_one(&self.pool)
            .await?;

        usize::try_from(count)
            .map_err(|_| DbError::InvalidData(format!("negative variant count: {}", count)))
    }

    async fn existing_ids(&self, ids: &[TaskId]) -> DbResult<HashSet<TaskId>> {
        let wanted: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        let found: Vec<String> = sqlx::query_scalar(EXISTING_TASK_IDS)
            .bind(wanted)
            .fetch_all(&self.pool)
            .await?;

        debug!(requested = ids.len(), found = found.len(), "Resolved task ids");
        Ok(found.into_iter().map(TaskId::new).collect())
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn find_latest_completed(
        &self,
        project: &str,
        build_variant: &str,
        display_name: &str,
        before_order: i64,
    ) -> cadence_core::Result<Option<TaskRecord>> {
        Ok(self
            .latest_completed(project, build_variant, display_name, before_order)
            .await?)
    }

    async fn count_failing_variants(
        &self,
        query: SimilarTaskQuery<'_>,
    ) -> cadence_core::Result<usize> {
        Ok(self.failing_variants(query).await?)
    }

    async fn existing_task_ids(&self, ids: &[TaskId]) -> cadence_core::Result<HashSet<TaskId>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        Ok(self.existing_ids(ids).await?)
    }
}
