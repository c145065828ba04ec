//! Database errors.

use thiserror::Error;

/// Errors from database operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("database closed")]
    Closed,

    #[error("not found")]
    NotFound,

    #[error("batch already written")]
    BatchAlreadyWritten,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corruption: {0}")]
    Corruption(String),
}

/// Result alias for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
