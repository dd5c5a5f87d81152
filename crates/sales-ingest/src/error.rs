//! Error types for the ingestion pipeline
//!
//! Row and batch failures are handled where they occur and never surface
//! here. [`IngestError`] covers whatever ends a job as `FAILED` (a broken
//! stream, a missing column, a timeout) plus setup errors such as an invalid
//! configuration. [`StorageError`] is what a sink reports for a rejected
//! call.

use sales_common::SalesError;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

/// Failure of an import run or of its setup
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required column '{0}' in header")]
    MissingColumn(String),

    #[error("Line {line}: {reason}")]
    InvalidRow { line: u64, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Outstanding batches did not finish within {0:?}")]
    CompletionTimeout(Duration),

    #[error("Batch worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("Import task panicked: {0}")]
    TaskPanicked(String),

    #[error("Batch dispatcher is closed")]
    DispatcherClosed,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Sales(#[from] SalesError),
}

/// Failure reported by a storage sink
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        // 23505 = unique_violation
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("23505") {
                return StorageError::DuplicateKey(db_err.message().to_string());
            }
        }
        StorageError::Database(err)
    }
}
