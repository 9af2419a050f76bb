//! # Link Notifications
//!
//! Mentions, organization invites and join requests, and the answers to them.
//!
//! - [`NotificationEngine`] validates and persists notifications, drives the
//!   `PENDING -> ACCEPTED | REJECTED` state machine and fans every new
//!   notification out as a live push plus a durable event.
//! - [`events`] holds the event envelope and the two transports:
//!   [`RedisEventBus`] and the in-process [`LocalEventBus`].
//! - [`NotificationRelay`] pushes events published by other processes to
//!   receivers connected to this one.

pub mod content;
pub mod engine;
pub mod events;
pub mod relay;
pub mod store;
pub mod types;

pub use engine::NotificationEngine;
pub use events::{
    EventEnvelope, EventMessage, EventPublisher, EventSubscriber, LocalEventBus, RedisEventBus,
    NOTIFICATION_TOPICS,
};
pub use relay::NotificationRelay;
pub use store::{NotificationStore, OrgDirectory};
pub use types::{
    Created, Delivery, InviteRequest, JoinRequest, MentionRequest, NotificationError,
    NotificationQuery, NotificationResult, PublishError, Responded, Respond,
};

pub use link_database::{Notification, NotificationKind, NotificationStatus, OrgType};
