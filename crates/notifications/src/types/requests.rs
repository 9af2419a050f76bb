//! Inputs accepted by the notification engine.

use link_database::{NotificationStatus, OrgType};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionRequest {
    pub receiver_id: i64,
}

/// A manager inviting someone into a company or one of its departments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteRequest {
    pub receiver_id: i64,
    pub invite_type: OrgType,
    #[serde(default)]
    pub company_id: Option<i64>,
    #[serde(default)]
    pub department_id: Option<i64>,
}

/// Someone asking a manager to be let into the manager's company or a department of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub receiver_id: i64,
    pub request_type: OrgType,
    #[serde(default)]
    pub department_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Respond {
    pub status: NotificationStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

impl NotificationQuery {
    pub fn page(&self) -> (u32, u32) {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (limit, self.offset.unwrap_or(0))
    }
}
