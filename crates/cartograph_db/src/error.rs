//! Error types for the persistence layer.

use thiserror::Error;

/// Database operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Persistence errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Serialization error for JSON-typed columns
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// State transition or initial state violates a job invariant
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Terminal transition attempted on a job that is not running
    #[error("Job {0} is not running (status: {1})")]
    JobNotRunning(String, String),

    /// The version-0 row of a procedure chain is absent
    #[error("Draft not found for procedure {0}")]
    DraftNotFound(String),

    /// The chain has no committed version to read or reset from
    #[error("No committed version for procedure {0}")]
    NoCommittedVersion(String),

    /// Caller does not own the resource
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl DbError {
    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}
