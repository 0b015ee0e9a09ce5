//! Error types for storage operations

use std::fmt;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// PostgreSQL SQLSTATE for "relation does not exist"
const SQLSTATE_UNDEFINED_TABLE: &str = "42P01";

/// PostgreSQL SQLSTATE for "check constraint violated"
const SQLSTATE_CHECK_VIOLATION: &str = "23514";

/// Errors that can occur during storage operations
#[derive(Debug)]
pub enum StorageError {
    /// Database connection failed
    ConnectionFailed(String),

    /// The destination table does not exist
    ///
    /// Distinguished because the insert pipeline recovers from it once by
    /// creating the schema and retrying.
    MissingTable(String),

    /// A table-existence check constraint failed
    ///
    /// Treated like a missing table by the insert pipeline.
    CheckViolation(String),

    /// Database query failed
    QueryFailed(String),

    /// Invalid configuration
    InvalidConfig(String),
}

impl StorageError {
    /// Whether the insert pipeline may recover by creating the schema.
    pub fn is_missing_schema(&self) -> bool {
        matches!(
            self,
            StorageError::MissingTable(_) | StorageError::CheckViolation(_)
        )
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed(msg) => {
                write!(f, "failed to connect to storage: {}", msg)
            }
            StorageError::MissingTable(msg) => write!(f, "destination table missing: {}", msg),
            StorageError::CheckViolation(msg) => write!(f, "check constraint violated: {}", msg),
            StorageError::QueryFailed(msg) => write!(f, "storage query failed: {}", msg),
            StorageError::InvalidConfig(msg) => write!(f, "invalid storage configuration: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(SQLSTATE_UNDEFINED_TABLE) => StorageError::MissingTable(db_err.to_string()),
                Some(SQLSTATE_CHECK_VIOLATION) => StorageError::CheckViolation(db_err.to_string()),
                _ => StorageError::QueryFailed(err.to_string()),
            },
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StorageError::ConnectionFailed(err.to_string())
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}
