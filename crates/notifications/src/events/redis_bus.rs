//! Redis pub/sub transport for notification events.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use super::{EventMessage, EventPublisher, EventSubscriber};
use crate::types::PublishError;

#[derive(Clone)]
pub struct RedisEventBus {
    client: redis::Client,
    connection: ConnectionManager,
}

impl RedisEventBus {
    pub async fn connect(url: &str) -> Result<Self, PublishError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client.clone()).await?;
        info!("redis event bus connected");
        Ok(Self { client, connection })
    }
}

#[async_trait]
impl EventPublisher for RedisEventBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), PublishError> {
        let mut connection = self.connection.clone();
        connection
            .publish::<_, _, ()>(topic, payload.as_ref())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber for RedisEventBus {
    async fn subscribe(
        &self,
        topics: &[&str],
    ) -> Result<BoxStream<'static, EventMessage>, PublishError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        for topic in topics {
            pubsub.subscribe(*topic).await?;
        }
        info!(?topics, "subscribed to redis channels");

        let messages = pubsub.into_on_message().map(|message| EventMessage {
            topic: message.get_channel_name().to_string(),
            payload: Bytes::copy_from_slice(message.get_payload_bytes()),
        });
        Ok(messages.boxed())
    }
}
