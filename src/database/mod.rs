pub mod manager;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

use std::time::Duration;
use thiserror::Error;

pub use manager::DatabaseManager;
pub use memory::MemoryCatalogStore;
pub use postgres::PgCatalogStore;
pub use store::{CatalogCommand, CatalogStore, CommitReceipt};

/// Errors from the store of record
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Database call timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DatabaseError::Conflict(db.constraint().unwrap_or("unique constraint").to_string())
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                DatabaseError::Invalid(db.constraint().unwrap_or("foreign key").to_string())
            }
            _ => DatabaseError::Sqlx(err),
        }
    }
}

/// Run a database call under a deadline. A timed-out call is dropped, which
/// rolls back any open transaction.
pub async fn bounded<T, F>(timeout: Duration, op: F) -> Result<T, DatabaseError>
where
    F: std::future::Future<Output = Result<T, DatabaseError>>,
{
    match tokio::time::timeout(timeout, op).await {
        Ok(result) => result,
        Err(_) => Err(DatabaseError::Timeout(timeout)),
    }
}
