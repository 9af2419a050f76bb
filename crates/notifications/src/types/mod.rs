//! Shared types for the notification engine.

pub mod errors;
pub mod requests;
pub mod responses;

pub use errors::{NotificationError, NotificationResult, PublishError};
pub use requests::{InviteRequest, JoinRequest, MentionRequest, NotificationQuery, Respond};
pub use responses::{Created, Delivery, Responded};
