//! WebSocket endpoints for the gateway
//!
//! Sockets are upgraded without HTTP authentication; the first frame carries
//! the token and is checked by the session validator.

pub mod chat;
pub mod user;

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::state::GatewayState;

pub fn create_websocket_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/ws/user", get(user::user_websocket_handler))
        .route("/ws/chat", get(chat::chat_websocket_handler))
}
