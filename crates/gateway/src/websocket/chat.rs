//! Room chat socket: `{token, roomId}` handshake, then chat frames relayed to the room.

use std::sync::Arc;

use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};
use tracing::debug;

use crate::state::GatewayState;

pub async fn chat_websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> Response {
    let sessions = state.sessions.clone();
    ws.on_upgrade(move |socket| async move {
        debug!("chat socket upgraded");
        sessions.serve_chat_socket(socket).await;
    })
}
