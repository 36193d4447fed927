//! Error types for the receipt pipeline.
//!
//! Each store has its own error enum so callers can tell a uniqueness
//! conflict from a backend failure, and a missing blob from an I/O error.
//! [`ReceiptError`] is what the pipeline operations return.

use thiserror::Error;

/// Content store failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file not found in content store: {0}")]
    NotFound(String),

    #[error("invalid location handle: {0}")]
    InvalidHandle(String),

    #[error("content store I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Record store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("uniqueness conflict: {0}")]
    Conflict(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Conflict(db_err.message().to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

/// Errors returned by ingest, validate, extract, and the receipt queries.
#[derive(Debug, Error)]
pub enum ReceiptError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("receipt file {0} has already been processed")]
    AlreadyProcessed(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T, E = ReceiptError> = std::result::Result<T, E>;
