//! Titles and display text for notifications.

use link_database::{NotificationKind, NotificationStatus, OrgType};

pub fn mention_title() -> String {
    "MENTION".to_string()
}

pub fn mention(sender: &str, receiver: &str) -> String {
    format!("{sender} mentioned {receiver}")
}

pub fn invite_title() -> String {
    "INVITE".to_string()
}

pub fn invite(org_type: OrgType, sender: &str, receiver: &str, org_name: &str) -> String {
    format!("[{org_type} INVITE] {sender} invited {receiver} to {org_name}")
}

pub fn request_title() -> String {
    "REQUEST".to_string()
}

pub fn request(org_type: OrgType, sender: &str, receiver: &str, org_name: &str) -> String {
    format!("[{org_type} REQUEST] {sender} asked {receiver} to join {org_name}")
}

pub fn response_title(decision: NotificationStatus) -> String {
    decision.to_string()
}

/// `responder` answered `requester`'s original invite or request.
pub fn response(
    decision: NotificationStatus,
    original: NotificationKind,
    org_type: Option<OrgType>,
    responder: &str,
    requester: &str,
) -> String {
    let verb = match decision {
        NotificationStatus::Accepted => "accepted",
        NotificationStatus::Rejected => "rejected",
        NotificationStatus::Pending => "saw",
    };
    let what = original.as_str().to_lowercase();
    match org_type {
        Some(org_type) => {
            format!("[{decision}] {responder} {verb} {requester}'s [{org_type}] {what}")
        }
        None => format!("[{decision}] {responder} {verb} {requester}'s {what}"),
    }
}
