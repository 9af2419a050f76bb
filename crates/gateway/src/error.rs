//! Error types for the gateway layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use link_auth::AuthError;
use link_notifications::NotificationError;
use link_realtime::LookupFailed;
use link_users::UserError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

/// Gateway error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            GatewayError::AuthorizationFailed(_) => StatusCode::FORBIDDEN,
            GatewayError::InvalidRequest(_) | GatewayError::InvalidState(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: status.as_str().to_string(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<AuthError> for GatewayError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Issue(message) => GatewayError::InternalError(message),
            other => GatewayError::AuthenticationFailed(other.to_string()),
        }
    }
}

impl From<UserError> for GatewayError {
    fn from(error: UserError) -> Self {
        match error {
            UserError::NotFound(user_id) => GatewayError::NotFound(format!("user {user_id}")),
            UserError::AlreadyExists(message) => GatewayError::Conflict(message),
            UserError::InvalidInput(message) => GatewayError::InvalidRequest(message),
            UserError::Conflict(message) => GatewayError::Conflict(message),
            UserError::Upstream(message) => GatewayError::InternalError(message),
        }
    }
}

impl From<NotificationError> for GatewayError {
    fn from(error: NotificationError) -> Self {
        match error {
            NotificationError::Forbidden(message) => GatewayError::AuthorizationFailed(message),
            NotificationError::NotFound(message) => GatewayError::NotFound(message),
            NotificationError::InvalidState(message) => GatewayError::InvalidState(message),
            NotificationError::InvalidInput(message) => GatewayError::InvalidRequest(message),
            NotificationError::Upstream(message) => GatewayError::InternalError(message),
        }
    }
}

impl From<LookupFailed> for GatewayError {
    fn from(error: LookupFailed) -> Self {
        GatewayError::InternalError(error.0)
    }
}
