//! Entities shared by the repositories and the domain crates

pub mod notification;
pub mod organization;
pub mod user;

pub use notification::{
    NewNotification, Notification, NotificationKind, NotificationStatus, OrgType, UnknownVariant,
};
pub use organization::{ChatRoom, Company, Department};
pub use user::{NewUser, OrgRef, UserRecord, UserRole, UserUpdate};
