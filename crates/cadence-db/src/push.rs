//! Push log storage backed by the `pushes` table.

use async_trait::async_trait;
use cadence_core::push::{PushLog, PushLogStore, PushStatus};
use cadence_core::{ResourceId, TaskId};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::schema::{FIND_PUSH_LOG_AFTER, INSERT_PUSH, UPDATE_PUSH_STATUS};
use crate::{DbError, DbResult};

/// Database row for pushes.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PushRow {
    pub id: Uuid,
    pub location: String,
    pub task_id: String,
    pub created_at: DateTime<Utc>,
    pub revision: String,
    pub order_number: i64,
    pub status: String,
}

impl TryFrom<PushRow> for PushLog {
    type Error = DbError;

    fn try_from(row: PushRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|_| DbError::InvalidData(format!("Unknown push status: {}", row.status)))?;

        Ok(PushLog {
            id: ResourceId::from_uuid(row.id),
            location: row.location,
            task_id: TaskId::new(row.task_id),
            created_at: row.created_at,
            revision: row.revision,
            order_number: row.order_number,
            status,
        })
    }
}

/// PostgreSQL implementation.
#[derive(Clone)]
pub struct PgPushLogStore {
    pool: PgPool,
}

impl PgPushLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_row(&self, log: &PushLog) -> DbResult<()> {
        sqlx::query(INSERT_PUSH)
            .bind(log.id.as_uuid())
            .bind(&log.location)
            .bind(log.task_id.as_str())
            .bind(log.created_at)
            .bind(&log.revision)
            .bind(log.order_number)
            .bind(log.status.as_str())
            .execute(&self.pool)
            .await?;

        info!(location = %log.location, task_id = %log.task_id, "Recorded push");
        Ok(())
    }

    async fn set_status(&self, id: ResourceId, status: PushStatus) -> DbResult<()> {
        let result = sqlx::query(UPDATE_PUSH_STATUS)
            .bind(id.as_uuid())
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("push {}", id)));
        }
        Ok(())
    }

    async fn latest_after(&self, location: &str, order_number: i64) -> DbResult<Option<PushLog>> {
        let row = sqlx::query_as::<_, PushRow>(FIND_PUSH_LOG_AFTER)
            .bind(location)
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await?;

        row.map(PushLog::try_from).transpose()
    }
}

#[async_trait]
impl PushLogStore for PgPushLogStore {
    async fn insert(&self, log: &PushLog) -> cadence_core::Result<()> {
        Ok(self.insert_row(log).await?)
    }

    async fn update_status(&self, id: ResourceId, status: PushStatus) -> cadence_core::Result<()> {
        Ok(self.set_status(id, status).await?)
    }

    async fn find_push_log_after(
        &self,
        location: &str,
        order_number: i64,
    ) -> cadence_core::Result<Option<PushLog>> {
        Ok(self.latest_after(location, order_number).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_into_push_log() {
        let id = Uuid::now_v7();
        let row = PushRow {
            id,
            location: "s3://builds/mongodb/linux/mongod.tgz".to_string(),
            task_id: "push_linux_abc".to_string(),
            created_at: Utc::now(),
            revision: "abc".to_string(),
            order_number: 7,
            status: "pushing".to_string(),
        };

        let log = PushLog::try_from(row).unwrap();
        assert_eq!(*log.id.as_uuid(), id);
        assert_eq!(log.status, PushStatus::Pushing);
        assert!(log.blocks("s3://builds/mongodb/linux/mongod.tgz", 7));
    }

    #[test]
    fn test_unknown_status_rejected() {
        let row = PushRow {
            id: Uuid::now_v7(),
            location: "loc".to_string(),
            task_id: "t".to_string(),
            created_at: Utc::now(),
            revision: "abc".to_string(),
            order_number: 1,
            status: "lost".to_string(),
        };
        assert!(matches!(PushLog::try_from(row), Err(DbError::InvalidData(_))));
    }
}
