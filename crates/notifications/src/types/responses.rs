//! Results reported by the notification engine.

use link_database::Notification;
use serde::Serialize;

/// How far a notification's fan-out got. Neither half blocks or undoes the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Delivery {
    /// Live connections of the receiver that accepted the push.
    pub live_recipients: usize,
    pub published: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Created {
    pub notification: Notification,
    pub delivery: Delivery,
}

/// Outcome of answering an invite or a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Responded {
    /// The answered notification, now terminal and read.
    pub notification: Notification,
    /// The role-reversed notification sent back to the original sender.
    pub response: Notification,
    pub delivery: Delivery,
}
