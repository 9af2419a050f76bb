//! Wire shapes for frames pushed to and read from sockets.

use axum::extract::ws::Message;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{RoomId, UserId};

pub const NOTIFICATION_FRAME: &str = "notification";
pub const CHAT_FRAME: &str = "chat";

/// Outbound frame: `{success, type, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushFrame {
    pub success: bool,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: serde_json::Value,
}

impl PushFrame {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            success: true,
            kind: kind.into(),
            payload,
        }
    }

    pub fn notification<T: Serialize>(payload: &T) -> serde_json::Result<Self> {
        Ok(Self::new(NOTIFICATION_FRAME, serde_json::to_value(payload)?))
    }

    pub fn chat(message: &ChatBroadcast) -> serde_json::Result<Self> {
        Ok(Self::new(CHAT_FRAME, serde_json::to_value(message)?))
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_message(&self) -> serde_json::Result<Message> {
        self.encode().map(Message::Text)
    }
}

/// Steady-state frame sent by a chat client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundChatFrame {
    pub content: String,
    #[serde(default)]
    pub message_type: Option<String>,
}

/// Payload of a chat frame re-broadcast to a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBroadcast {
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub content: String,
    pub message_type: String,
    pub sent_at: String,
}

impl ChatBroadcast {
    pub fn from_inbound(room_id: RoomId, sender_id: UserId, frame: InboundChatFrame) -> Self {
        Self {
            room_id,
            sender_id,
            content: frame.content,
            message_type: frame.message_type.unwrap_or_else(|| "text".to_string()),
            sent_at: Utc::now().to_rfc3339(),
        }
    }
}
