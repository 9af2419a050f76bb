//! Durable event publishing and cross-process fan-out.

pub mod local_bus;
pub mod redis_bus;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use link_database::Notification;
use serde::{Deserialize, Serialize};

use crate::types::PublishError;

pub use local_bus::LocalEventBus;
pub use redis_bus::RedisEventBus;

pub const MENTION_TOPIC: &str = "link.event.notification.mention";
pub const INVITE_REQUEST_TOPIC: &str = "link.event.notification.invite.request";
pub const INVITE_RESPONSE_TOPIC: &str = "link.event.notification.invite.response";
pub const REQUEST_TOPIC: &str = "link.event.notification.request";

pub const NOTIFICATION_TOPICS: [&str; 4] = [
    MENTION_TOPIC,
    INVITE_REQUEST_TOPIC,
    INVITE_RESPONSE_TOPIC,
    REQUEST_TOPIC,
];

/// A message received from a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// `publish(topic, bytes)`.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), PublishError>;
}

/// `subscribe(topic) -> lazy sequence of bytes`, for several topics at once.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn subscribe(
        &self,
        topics: &[&str],
    ) -> Result<BoxStream<'static, EventMessage>, PublishError>;
}

/// Wire form of a published notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_id: String,
    /// Instance id of the publishing process.
    pub origin: String,
    pub topic: String,
    pub notification: Notification,
}

impl EventEnvelope {
    pub fn new(origin: &str, topic: &str, notification: Notification) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            origin: origin.to_string(),
            topic: topic.to_string(),
            notification,
        }
    }

    pub fn encode(&self) -> Result<Bytes, PublishError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn decode(payload: &[u8]) -> Result<Self, PublishError> {
        Ok(serde_json::from_slice(payload)?)
    }
}
