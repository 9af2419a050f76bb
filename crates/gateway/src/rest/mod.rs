//! REST API endpoints for the gateway

pub mod health;
pub mod notifications;
pub mod users;

use std::sync::Arc;

use axum::Router;

use crate::state::GatewayState;

/// Routes mounted under `/api`; every one requires a bearer token.
pub fn create_rest_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .merge(users::create_user_routes())
        .merge(notifications::create_notification_routes())
}
