//! Notification entity definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Mention,
    Invite,
    Request,
    Response,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Mention => "MENTION",
            NotificationKind::Invite => "INVITE",
            NotificationKind::Request => "REQUEST",
            NotificationKind::Response => "RESPONSE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "PENDING",
            NotificationStatus::Accepted => "ACCEPTED",
            NotificationStatus::Rejected => "REJECTED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, NotificationStatus::Accepted | NotificationStatus::Rejected)
    }
}

/// Organization targeted by an invite or a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrgType {
    Company,
    Department,
}

impl OrgType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgType::Company => "COMPANY",
            OrgType::Department => "DEPARTMENT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant `{}`", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

macro_rules! impl_from_str {
    ($ty:ty, $($text:literal => $variant:expr),+ $(,)?) => {
        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($variant),)+
                    other => Err(UnknownVariant(other.to_string())),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_from_str!(NotificationKind,
    "MENTION" => NotificationKind::Mention,
    "INVITE" => NotificationKind::Invite,
    "REQUEST" => NotificationKind::Request,
    "RESPONSE" => NotificationKind::Response,
);

impl_from_str!(NotificationStatus,
    "PENDING" => NotificationStatus::Pending,
    "ACCEPTED" => NotificationStatus::Accepted,
    "REJECTED" => NotificationStatus::Rejected,
);

impl_from_str!(OrgType,
    "COMPANY" => OrgType::Company,
    "DEPARTMENT" => OrgType::Department,
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub kind: NotificationKind,
    pub org_type: Option<OrgType>,
    pub status: Option<NotificationStatus>,
    pub is_read: bool,
    pub title: String,
    pub content: String,
    pub company_id: Option<i64>,
    pub company_name: Option<String>,
    pub department_id: Option<i64>,
    pub department_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Values supplied when persisting a notification; ids and timestamps are assigned on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub sender_id: i64,
    pub receiver_id: i64,
    pub kind: NotificationKind,
    pub org_type: Option<OrgType>,
    pub status: Option<NotificationStatus>,
    pub title: String,
    pub content: String,
    pub company_id: Option<i64>,
    pub company_name: Option<String>,
    pub department_id: Option<i64>,
    pub department_name: Option<String>,
}
