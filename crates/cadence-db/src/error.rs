//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<DbError> for cadence_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => cadence_core::Error::NotFound(what),
            DbError::Database(sqlx::Error::PoolTimedOut) => {
                cadence_core::Error::Timeout("waiting for a database connection".to_string())
            }
            other => cadence_core::Error::Backend(other.to_string()),
        }
    }
}
