//! In-process event bus used when no Redis is configured.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{EventMessage, EventPublisher, EventSubscriber};
use crate::types::PublishError;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct LocalEventBus {
    sender: broadcast::Sender<EventMessage>,
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LocalEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }
}

#[async_trait]
impl EventPublisher for LocalEventBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), PublishError> {
        let message = EventMessage {
            topic: topic.to_string(),
            payload,
        };
        // No subscribers is not an error for a fire-and-forget bus.
        if self.sender.send(message).is_err() {
            debug!(topic, "published with no local subscribers");
        }
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber for LocalEventBus {
    async fn subscribe(
        &self,
        topics: &[&str],
    ) -> Result<BoxStream<'static, EventMessage>, PublishError> {
        let topics: Vec<String> = topics.iter().map(|topic| topic.to_string()).collect();
        let receiver = self.sender.subscribe();

        let messages = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => return Some((message, receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "local event subscriber lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .filter(move |message| {
            let wanted = topics.iter().any(|topic| *topic == message.topic);
            async move { wanted }
        });

        Ok(messages.boxed())
    }
}
