//! Error types for the user state layer.

use std::time::Duration;

use link_database::DatabaseError;
use thiserror::Error;

/// Failures of the cache backend. Never surfaced to callers of read paths.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache write timed out after {0:?}")]
    Timeout(Duration),

    #[error("cache record could not be decoded: {0}")]
    Decode(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(error: redis::RedisError) -> Self {
        CacheError::Backend(error.to_string())
    }
}

/// User-related errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UserError {
    #[error("User {0} not found")]
    NotFound(i64),

    #[error("User already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid user data: {0}")]
    InvalidInput(String),

    /// The stored row no longer permits the requested change.
    #[error("Conflicting user state: {0}")]
    Conflict(String),

    #[error("User store failure: {0}")]
    Upstream(String),
}

pub type UserResult<T> = Result<T, UserError>;

impl From<DatabaseError> for UserError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::Duplicate(message) => UserError::AlreadyExists(message),
            DatabaseError::Conflict(message) => UserError::Conflict(message),
            other => UserError::Upstream(other.to_string()),
        }
    }
}
