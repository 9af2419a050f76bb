//! Per-user socket: `{token}` handshake, then live notification pushes.

use std::sync::Arc;

use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};
use tracing::debug;

use crate::state::GatewayState;

pub async fn user_websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> Response {
    let sessions = state.sessions.clone();
    ws.on_upgrade(move |socket| async move {
        debug!("user socket upgraded");
        sessions.serve_user_socket(socket).await;
    })
}
