//! Error types for the notification engine and event transport.

use std::time::Duration;

use link_database::DatabaseError;
use link_users::UserError;
use thiserror::Error;

/// Domain failures of notification operations.
///
/// `Forbidden` is the authorization failure (wrong role or not the receiver).
/// Authentication happens before the engine is reached.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),
}

impl NotificationError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

pub type NotificationResult<T> = Result<T, NotificationError>;

impl From<DatabaseError> for NotificationError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::NotFound(what) => NotificationError::NotFound(what),
            other => NotificationError::Upstream(other.to_string()),
        }
    }
}

impl From<UserError> for NotificationError {
    fn from(error: UserError) -> Self {
        match error {
            UserError::NotFound(user_id) => NotificationError::NotFound(format!("user {user_id}")),
            UserError::AlreadyExists(message) | UserError::InvalidInput(message) => {
                NotificationError::InvalidInput(message)
            }
            UserError::Conflict(message) => NotificationError::InvalidState(message),
            UserError::Upstream(message) => NotificationError::Upstream(message),
        }
    }
}

/// Failures of the durable event transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("event encoding failed: {0}")]
    Encode(String),

    #[error("event transport failed: {0}")]
    Transport(String),

    #[error("event publish timed out after {0:?}")]
    Timeout(Duration),
}

impl From<redis::RedisError> for PublishError {
    fn from(error: redis::RedisError) -> Self {
        PublishError::Transport(error.to_string())
    }
}

impl From<serde_json::Error> for PublishError {
    fn from(error: serde_json::Error) -> Self {
        PublishError::Encode(error.to_string())
    }
}
