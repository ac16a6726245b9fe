//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No blob under the requested key.
    #[error("blob not found: {0}")]
    NotFound(String),

    /// Key rejected by the backend.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding backend state was poisoned by a panic.
    #[error("lock poisoned: {0}")]
    Poisoned(String),

    /// A blocking task failed to complete.
    #[error("background task failed: {0}")]
    Task(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
