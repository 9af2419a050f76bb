use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::UserId;

/// Process-unique identity of one socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Frames waiting to be written to one socket, drained by that socket's writer task.
pub type OutboundQueue = mpsc::Receiver<Message>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,
    #[error("outbound queue full")]
    Backpressure,
}

/// Cheap, cloneable reference to a live connection.
///
/// Delivery never waits: a frame is either queued immediately or dropped.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    user_id: UserId,
    outbound: mpsc::Sender<Message>,
    alive: Arc<AtomicBool>,
}

impl ConnectionHandle {
    pub(crate) fn new(id: ConnectionId, user_id: UserId, buffer: usize) -> (Self, OutboundQueue) {
        let (outbound, queue) = mpsc::channel(buffer.max(1));
        let handle = Self {
            id,
            user_id,
            outbound,
            alive: Arc::new(AtomicBool::new(true)),
        };
        (handle, queue)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire) && !self.outbound.is_closed()
    }

    pub(crate) fn mark_closed(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub fn deliver(&self, message: Message) -> Result<(), DeliveryError> {
        if !self.is_alive() {
            return Err(DeliveryError::Closed);
        }

        self.outbound.try_send(message).map_err(|error| match error {
            TrySendError::Full(_) => DeliveryError::Backpressure,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}
