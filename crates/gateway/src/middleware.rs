//! Authentication and request tracing

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use link_auth::AuthenticatedUser;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{debug, Level};

use crate::error::GatewayError;
use crate::state::GatewayState;

/// Verifies the `Authorization: Bearer` header and stores the caller in the request extensions.
pub async fn auth_middleware(
    State(state): State<Arc<GatewayState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            GatewayError::AuthenticationFailed("Missing authentication token".to_string())
        })?;

    let user = state.authenticator.authenticate(token)?;
    debug!(user_id = user.user_id, path = %request.uri().path(), "request authenticated");

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Caller identity placed by [`auth_middleware`].
pub type CurrentUser = axum::Extension<AuthenticatedUser>;

pub fn create_trace_middleware() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO))
}
