//! Hub router: per-connection receive loops and best-effort fan-out.

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::connection::{ConnectionHandle, ConnectionId, DeliveryError, OutboundQueue};
use crate::frame::{ChatBroadcast, InboundChatFrame, PushFrame};
use crate::registry::{ConnectionRegistry, PresenceSink};
use crate::{RoomId, UserId};

#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    registry: ConnectionRegistry,
    next_connection: AtomicU64,
    outbound_buffer: usize,
}

/// Why a receive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    ClientClosed,
    StreamEnded,
    DecodeError,
    TransportError,
    WriterClosed,
}

impl Hub {
    pub fn new(presence: Arc<dyn PresenceSink>, outbound_buffer: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                registry: ConnectionRegistry::new(presence),
                next_connection: AtomicU64::new(1),
                outbound_buffer,
            }),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    /// Allocates a connection and its outbound queue. Nothing is registered yet.
    pub fn open_connection(&self, user_id: UserId) -> (ConnectionHandle, OutboundQueue) {
        let id = ConnectionId(self.inner.next_connection.fetch_add(1, Ordering::Relaxed));
        ConnectionHandle::new(id, user_id, self.inner.outbound_buffer)
    }

    /// Registers the connection (and joins `room`, if any) exactly once.
    ///
    /// Dropping the returned guard unregisters it.
    pub fn admit(&self, connection: ConnectionHandle, room: Option<RoomId>) -> RegistrationGuard {
        let registry = self.registry();
        registry.register(connection.user_id(), connection.clone());
        if let Some(room_id) = room {
            registry.join_room(room_id, &connection);
        }
        RegistrationGuard {
            hub: self.clone(),
            connection,
        }
    }

    /// Pushes `frame` to every live connection of `user_id`. Returns how many accepted it.
    pub fn send_to_user(&self, user_id: UserId, frame: &PushFrame) -> usize {
        let targets = self.registry().connections_for_user(user_id);
        deliver_all(&targets, frame)
    }

    /// Pushes `frame` to every connection currently joined to `room_id`.
    pub fn send_to_room(&self, room_id: RoomId, frame: &PushFrame) -> usize {
        let targets = self.registry().connections_in_room(room_id);
        deliver_all(&targets, frame)
    }

    /// Drives one admitted connection until the client leaves or sends something undecodable.
    ///
    /// The outbound queue is drained by a dedicated writer task so pushes from
    /// other tasks never wait on this socket. The registration is released on
    /// every exit path when `guard` drops.
    pub async fn run_connection<S, E, W>(
        &self,
        guard: RegistrationGuard,
        outbound: OutboundQueue,
        sink: W,
        mut stream: S,
    ) -> ExitReason
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
        W: Sink<Message> + Unpin + Send + 'static,
        W::Error: Display + Send,
    {
        let connection_id = guard.connection().id();
        let user_id = guard.connection().user_id();
        let mut writer = tokio::spawn(write_outbound(connection_id, outbound, sink));

        let reason = tokio::select! {
            reason = self.read_inbound(guard.connection(), &mut stream) => reason,
            _ = &mut writer => ExitReason::WriterClosed,
        };

        drop(guard);
        writer.abort();

        info!(user_id, %connection_id, ?reason, "connection finished");
        reason
    }

    async fn read_inbound<S, E>(&self, connection: &ConnectionHandle, stream: &mut S) -> ExitReason
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<InboundChatFrame>(&text) {
                    Ok(inbound) => self.forward(connection, inbound),
                    Err(error) => {
                        warn!(
                            user_id = connection.user_id(),
                            connection_id = %connection.id(),
                            %error,
                            "undecodable frame, closing connection"
                        );
                        return ExitReason::DecodeError;
                    }
                },
                Ok(Message::Close(_)) => return ExitReason::ClientClosed,
                Ok(_) => {}
                Err(error) => {
                    debug!(connection_id = %connection.id(), %error, "socket read failed");
                    return ExitReason::TransportError;
                }
            }
        }
        ExitReason::StreamEnded
    }

    fn forward(&self, connection: &ConnectionHandle, inbound: InboundChatFrame) {
        let Some(room_id) = self.registry().room_of(connection.id()) else {
            debug!(connection_id = %connection.id(), "ignoring chat frame on a connection without a room");
            return;
        };

        let broadcast = ChatBroadcast::from_inbound(room_id, connection.user_id(), inbound);
        match PushFrame::chat(&broadcast) {
            Ok(frame) => {
                let delivered = self.send_to_room(room_id, &frame);
                debug!(room_id, delivered, "chat frame forwarded");
            }
            Err(error) => warn!(%error, "failed to encode chat frame"),
        }
    }
}

fn deliver_all(targets: &[ConnectionHandle], frame: &PushFrame) -> usize {
    if targets.is_empty() {
        return 0;
    }

    let text = match frame.encode() {
        Ok(text) => text,
        Err(error) => {
            warn!(%error, kind = %frame.kind, "failed to encode push frame");
            return 0;
        }
    };

    let mut delivered = 0;
    for target in targets {
        match target.deliver(Message::Text(text.clone())) {
            Ok(()) => delivered += 1,
            Err(DeliveryError::Closed) => {
                debug!(connection_id = %target.id(), "dropping frame for closed connection");
            }
            Err(DeliveryError::Backpressure) => {
                warn!(
                    connection_id = %target.id(),
                    user_id = target.user_id(),
                    "outbound queue full, dropping frame"
                );
            }
        }
    }
    delivered
}

async fn write_outbound<W>(connection_id: ConnectionId, mut outbound: OutboundQueue, mut sink: W)
where
    W: Sink<Message> + Unpin,
    W::Error: Display + Send,
{
    while let Some(message) = outbound.recv().await {
        if let Err(error) = sink.send(message).await {
            debug!(%connection_id, %error, "socket write failed, stopping writer");
            break;
        }
    }
    let _ = sink.close().await;
}

/// Keeps a connection registered for as long as it lives.
pub struct RegistrationGuard {
    hub: Hub,
    connection: ConnectionHandle,
}

impl RegistrationGuard {
    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.hub
            .registry()
            .unregister(self.connection.user_id(), self.connection.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::NoopPresence;
    use serde_json::json;

    fn hub() -> Hub {
        Hub::new(Arc::new(NoopPresence), 16)
    }

    fn text(message: Message) -> serde_json::Value {
        match message {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_to_user_reaches_every_device() {
        let hub = hub();
        let (a, mut qa) = hub.open_connection(5);
        let (b, mut qb) = hub.open_connection(5);
        let _ga = hub.admit(a, None);
        let _gb = hub.admit(b, None);

        let frame = PushFrame::new("notification", json!({"n": 1}));
        assert_eq!(hub.send_to_user(5, &frame), 2);

        assert_eq!(text(qa.recv().await.unwrap())["payload"]["n"], 1);
        assert_eq!(text(qb.recv().await.unwrap())["payload"]["n"], 1);
    }

    #[tokio::test]
    async fn dead_connection_does_not_abort_fan_out() {
        let hub = hub();
        let (alive, mut alive_queue) = hub.open_connection(1);
        let (dead, dead_queue) = hub.open_connection(2);
        let _g1 = hub.admit(alive, Some(9));
        let _g2 = hub.admit(dead, Some(9));
        drop(dead_queue);

        let frame = PushFrame::new("chat", json!({}));
        assert_eq!(hub.send_to_room(9, &frame), 1);
        assert!(alive_queue.recv().await.is_some());
    }

    #[tokio::test]
    async fn frames_keep_issue_order_per_connection() {
        let hub = hub();
        let (conn, mut queue) = hub.open_connection(1);
        let _guard = hub.admit(conn, Some(3));

        for n in 0..5 {
            if n % 2 == 0 {
                hub.send_to_user(1, &PushFrame::new("notification", json!({"n": n})));
            } else {
                hub.send_to_room(3, &PushFrame::new("chat", json!({"n": n})));
            }
        }

        for n in 0..5 {
            assert_eq!(text(queue.recv().await.unwrap())["payload"]["n"], n);
        }
    }

    #[tokio::test]
    async fn dropping_guard_unregisters_once() {
        let hub = hub();
        let (conn, _queue) = hub.open_connection(8);
        let id = conn.id();
        let guard = hub.admit(conn, Some(1));
        assert_eq!(hub.registry().connection_count(8), 1);

        drop(guard);
        assert_eq!(hub.registry().connection_count(8), 0);
        assert_eq!(hub.registry().room_size(1), 0);
        assert!(!hub.registry().unregister(8, id));
    }
}
