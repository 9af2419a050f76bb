//! Pushes notifications published by other processes to locally connected receivers.

use std::sync::Arc;

use futures_util::stream::{BoxStream, StreamExt};
use link_realtime::{Hub, PushFrame};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::{EventEnvelope, EventMessage, EventSubscriber, NOTIFICATION_TOPICS};
use crate::types::PublishError;

pub struct NotificationRelay {
    hub: Hub,
    origin: String,
}

impl NotificationRelay {
    pub fn new(hub: Hub, origin: impl Into<String>) -> Self {
        Self {
            hub,
            origin: origin.into(),
        }
    }

    /// Delivers one event and returns how many local connections accepted it.
    ///
    /// Events published by this process were already pushed at creation time
    /// and are skipped.
    pub fn handle(&self, message: &EventMessage) -> usize {
        let envelope = match EventEnvelope::decode(&message.payload) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(topic = %message.topic, %error, "dropping undecodable event");
                return 0;
            }
        };
        if envelope.origin == self.origin {
            return 0;
        }

        let notification = &envelope.notification;
        match PushFrame::notification(notification) {
            Ok(frame) => {
                let delivered = self.hub.send_to_user(notification.receiver_id, &frame);
                debug!(
                    event_id = %envelope.event_id,
                    notification_id = %notification.id,
                    receiver_id = notification.receiver_id,
                    delivered,
                    "relayed notification"
                );
                delivered
            }
            Err(error) => {
                warn!(event_id = %envelope.event_id, %error, "failed to encode relayed notification");
                0
            }
        }
    }

    /// Consumes `events` until the subscription ends.
    pub async fn run(self, mut events: BoxStream<'static, EventMessage>) {
        while let Some(message) = events.next().await {
            self.handle(&message);
        }
        info!("notification relay subscription ended");
    }

    /// Subscribes to every notification topic and runs the relay in the background.
    pub async fn spawn(
        self,
        subscriber: Arc<dyn EventSubscriber>,
    ) -> Result<JoinHandle<()>, PublishError> {
        let events = subscriber.subscribe(&NOTIFICATION_TOPICS).await?;
        info!(origin = %self.origin, "notification relay started");
        Ok(tokio::spawn(self.run(events)))
    }
}
