//! Notification creation, the invite/request state machine and fan-out.

use std::sync::Arc;
use std::time::Duration;

use link_database::{
    NewNotification, Notification, NotificationKind, NotificationStatus, OrgType, UserRecord,
    UserUpdate,
};
use link_realtime::{Hub, PushFrame};
use link_users::UserStateCache;
use tracing::{debug, error, info, warn};

use crate::content;
use crate::events::{
    EventEnvelope, EventPublisher, INVITE_REQUEST_TOPIC, INVITE_RESPONSE_TOPIC, MENTION_TOPIC,
    REQUEST_TOPIC,
};
use crate::store::{NotificationStore, OrgDirectory};
use crate::types::{
    Created, Delivery, InviteRequest, JoinRequest, MentionRequest, NotificationError,
    NotificationQuery, NotificationResult, PublishError, Responded,
};

/// Organization an invite or request points at, resolved to display names.
struct Target {
    org_type: OrgType,
    company_id: i64,
    company_name: String,
    department: Option<(i64, String)>,
}

impl Target {
    fn display_name(&self) -> &str {
        match &self.department {
            Some((_, name)) => name,
            None => &self.company_name,
        }
    }
}

pub struct NotificationEngine {
    store: Arc<dyn NotificationStore>,
    users: Arc<UserStateCache>,
    orgs: Arc<dyn OrgDirectory>,
    hub: Hub,
    publisher: Arc<dyn EventPublisher>,
    origin: String,
    publish_timeout: Duration,
}

impl NotificationEngine {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        users: Arc<UserStateCache>,
        orgs: Arc<dyn OrgDirectory>,
        hub: Hub,
        publisher: Arc<dyn EventPublisher>,
        origin: impl Into<String>,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            store,
            users,
            orgs,
            hub,
            publisher,
            origin: origin.into(),
            publish_timeout,
        }
    }

    /// Instance id stamped on every published envelope.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub async fn create_mention(
        &self,
        sender_id: i64,
        request: &MentionRequest,
    ) -> NotificationResult<Created> {
        ensure_distinct(sender_id, request.receiver_id)?;
        let sender = self.users.get(sender_id).await?;
        let receiver = self.users.get(request.receiver_id).await?;

        let notification = self
            .store
            .create(&NewNotification {
                sender_id,
                receiver_id: receiver.id,
                kind: NotificationKind::Mention,
                org_type: None,
                status: None,
                title: content::mention_title(),
                content: content::mention(&sender.name, &receiver.name),
                company_id: None,
                company_name: None,
                department_id: None,
                department_name: None,
            })
            .await?;

        let delivery = self.fan_out(&notification, MENTION_TOPIC).await;
        Ok(Created {
            notification,
            delivery,
        })
    }

    /// A manager invites someone into a company or a department.
    ///
    /// The invite is persisted before it is pushed and published.
    pub async fn create_invite(
        &self,
        sender_id: i64,
        request: &InviteRequest,
    ) -> NotificationResult<Created> {
        ensure_distinct(sender_id, request.receiver_id)?;
        let sender = self.users.get(sender_id).await?;
        let receiver = self.users.get(request.receiver_id).await?;

        if !sender.role.is_manager() {
            return Err(NotificationError::forbidden("only managers can send invites"));
        }
        if receiver.role.is_operator() {
            return Err(NotificationError::forbidden("operators cannot be invited"));
        }

        let target = match request.invite_type {
            OrgType::Company => {
                if receiver.company_id.is_some() {
                    return Err(NotificationError::invalid_state(
                        "receiver already belongs to a company",
                    ));
                }
                let company_id = request
                    .company_id
                    .or(sender.company_id)
                    .ok_or_else(|| NotificationError::invalid_input("company_id is required"))?;
                ensure_company_access(&sender, company_id)?;
                self.company_target(company_id).await?
            }
            OrgType::Department => {
                let department_id = request
                    .department_id
                    .ok_or_else(|| NotificationError::invalid_input("department_id is required"))?;
                let target = self.department_target(department_id).await?;
                ensure_company_access(&sender, target.company_id)?;
                if receiver.company_id != Some(target.company_id) {
                    return Err(NotificationError::invalid_state(
                        "receiver does not belong to the department's company",
                    ));
                }
                if receiver.in_department(department_id) {
                    return Err(NotificationError::invalid_state(
                        "receiver already belongs to the department",
                    ));
                }
                target
            }
        };

        let notification = self
            .store
            .create(&pending(
                &sender,
                &receiver,
                NotificationKind::Invite,
                content::invite_title(),
                content::invite(
                    target.org_type,
                    &sender.name,
                    &receiver.name,
                    target.display_name(),
                ),
                &target,
            ))
            .await?;
        info!(
            notification_id = %notification.id,
            sender_id,
            receiver_id = receiver.id,
            org_type = %target.org_type,
            "invite created"
        );

        let delivery = self.fan_out(&notification, INVITE_REQUEST_TOPIC).await;
        Ok(Created {
            notification,
            delivery,
        })
    }

    /// Someone asks a manager to be let into the manager's company or one of its departments.
    pub async fn create_request(
        &self,
        sender_id: i64,
        request: &JoinRequest,
    ) -> NotificationResult<Created> {
        ensure_distinct(sender_id, request.receiver_id)?;
        let sender = self.users.get(sender_id).await?;
        let receiver = self.users.get(request.receiver_id).await?;

        if sender.role.is_operator() {
            return Err(NotificationError::forbidden("operators cannot send join requests"));
        }
        if !receiver.role.is_manager() {
            return Err(NotificationError::invalid_input("receiver is not a manager"));
        }
        let company_id = receiver
            .company_id
            .ok_or_else(|| NotificationError::invalid_input("receiver does not manage a company"))?;

        let target = match request.request_type {
            OrgType::Company => {
                if sender.company_id.is_some() {
                    return Err(NotificationError::invalid_state(
                        "sender already belongs to a company",
                    ));
                }
                self.company_target(company_id).await?
            }
            OrgType::Department => {
                let department_id = request
                    .department_id
                    .ok_or_else(|| NotificationError::invalid_input("department_id is required"))?;
                let target = self.department_target(department_id).await?;
                if target.company_id != company_id {
                    return Err(NotificationError::invalid_input(
                        "department is not part of the receiver's company",
                    ));
                }
                if sender.company_id != Some(company_id) {
                    return Err(NotificationError::invalid_state(
                        "sender does not belong to the department's company",
                    ));
                }
                if sender.in_department(department_id) {
                    return Err(NotificationError::invalid_state(
                        "sender already belongs to the department",
                    ));
                }
                target
            }
        };

        let notification = self
            .store
            .create(&pending(
                &sender,
                &receiver,
                NotificationKind::Request,
                content::request_title(),
                content::request(
                    target.org_type,
                    &sender.name,
                    &receiver.name,
                    target.display_name(),
                ),
                &target,
            ))
            .await?;
        info!(
            notification_id = %notification.id,
            sender_id,
            receiver_id = receiver.id,
            org_type = %target.org_type,
            "join request created"
        );

        let delivery = self.fan_out(&notification, REQUEST_TOPIC).await;
        Ok(Created {
            notification,
            delivery,
        })
    }

    /// Accepts or rejects a pending invite or request.
    ///
    /// Only the receiver may answer, and only once. Acceptance moves the
    /// joining party into the organization before the answer is reported back
    /// to the original sender as a `RESPONSE` notification.
    pub async fn respond(
        &self,
        notification_id: &str,
        responder_id: i64,
        decision: NotificationStatus,
    ) -> NotificationResult<Responded> {
        if !decision.is_terminal() {
            return Err(NotificationError::invalid_input(
                "status must be ACCEPTED or REJECTED",
            ));
        }

        let original = self.load(notification_id).await?;
        if original.receiver_id != responder_id {
            return Err(NotificationError::forbidden(
                "only the receiver can answer this notification",
            ));
        }
        if !matches!(original.kind, NotificationKind::Invite | NotificationKind::Request) {
            return Err(NotificationError::invalid_state(format!(
                "{} notifications cannot be answered",
                original.kind
            )));
        }
        if original.status != Some(NotificationStatus::Pending) {
            return Err(already_answered(&original));
        }

        let responder = self.users.get(responder_id).await?;
        let requester = self.users.get(original.sender_id).await?;

        let membership = match decision {
            NotificationStatus::Accepted => {
                let joiner_id = match original.kind {
                    NotificationKind::Invite => responder.id,
                    _ => requester.id,
                };
                // The cached copy may trail a membership change that has already committed.
                let joiner = self.users.get_fresh(joiner_id).await?;
                Some((joiner_id, membership_update(&original, &joiner)?))
            }
            _ => None,
        };

        let moved = self
            .store
            .transition_status(notification_id, NotificationStatus::Pending, decision)
            .await?;
        if !moved {
            return Err(already_answered(&original));
        }

        if let Some((joiner_id, update)) = membership {
            if let Err(failure) = self.users.update(joiner_id, &update).await {
                error!(
                    notification_id,
                    joiner_id,
                    error = %failure,
                    "membership change failed, restoring pending status"
                );
                if let Err(restore) = self
                    .store
                    .transition_status(notification_id, decision, NotificationStatus::Pending)
                    .await
                {
                    error!(notification_id, error = %restore, "failed to restore pending status");
                }
                return Err(failure.into());
            }
            info!(notification_id, joiner_id, "membership granted");
        }

        // Status and membership are committed; a failed read flag is only logged.
        let mut notification = original.clone();
        notification.status = Some(decision);
        match self.store.mark_read(notification_id).await {
            Ok(_) => notification.is_read = true,
            Err(failure) => {
                warn!(notification_id, error = %failure, "failed to mark answered notification read")
            }
        }

        let response = self
            .store
            .create(&NewNotification {
                sender_id: responder.id,
                receiver_id: requester.id,
                kind: NotificationKind::Response,
                org_type: original.org_type,
                status: Some(decision),
                title: content::response_title(decision),
                content: content::response(
                    decision,
                    original.kind,
                    original.org_type,
                    &responder.name,
                    &requester.name,
                ),
                company_id: original.company_id,
                company_name: original.company_name.clone(),
                department_id: original.department_id,
                department_name: original.department_name.clone(),
            })
            .await
            .map_err(|failure| {
                error!(notification_id, error = %failure, "failed to persist response notification");
                NotificationError::Upstream(failure.to_string())
            })?;
        info!(notification_id, status = %decision, response_id = %response.id, "notification answered");

        let delivery = self.fan_out(&response, INVITE_RESPONSE_TOPIC).await;
        Ok(Responded {
            notification,
            response,
            delivery,
        })
    }

    /// Sets the read flag. Re-reading an already-read notification is a no-op.
    pub async fn mark_read(
        &self,
        notification_id: &str,
        receiver_id: i64,
    ) -> NotificationResult<Notification> {
        let notification = self.load(notification_id).await?;
        if notification.receiver_id != receiver_id {
            return Err(NotificationError::forbidden(
                "only the receiver can mark a notification read",
            ));
        }
        if notification.is_read {
            return Ok(notification);
        }

        if self.store.mark_read(notification_id).await? {
            debug!(notification_id, receiver_id, "notification marked read");
        }
        self.load(notification_id).await
    }

    /// The receiver's notifications, newest first.
    pub async fn list(
        &self,
        receiver_id: i64,
        query: &NotificationQuery,
    ) -> NotificationResult<Vec<Notification>> {
        let (limit, offset) = query.page();
        Ok(self
            .store
            .list(receiver_id, query.unread_only, limit, offset)
            .await?)
    }

    async fn load(&self, notification_id: &str) -> NotificationResult<Notification> {
        self.store
            .find(notification_id)
            .await?
            .ok_or_else(|| NotificationError::NotFound(format!("notification {notification_id}")))
    }

    async fn company_target(&self, company_id: i64) -> NotificationResult<Target> {
        let company = self
            .orgs
            .company(company_id)
            .await?
            .ok_or_else(|| NotificationError::NotFound(format!("company {company_id}")))?;
        Ok(Target {
            org_type: OrgType::Company,
            company_id: company.id,
            company_name: company.name,
            department: None,
        })
    }

    async fn department_target(&self, department_id: i64) -> NotificationResult<Target> {
        let department = self
            .orgs
            .department(department_id)
            .await?
            .ok_or_else(|| NotificationError::NotFound(format!("department {department_id}")))?;
        let company = self.company_target(department.company_id).await?;
        Ok(Target {
            org_type: OrgType::Department,
            department: Some((department.id, department.name)),
            ..company
        })
    }

    /// Live push to the receiver, then the durable publish. Neither waits on nor undoes the other.
    async fn fan_out(&self, notification: &Notification, topic: &str) -> Delivery {
        let live_recipients = match PushFrame::notification(notification) {
            Ok(frame) => self.hub.send_to_user(notification.receiver_id, &frame),
            Err(failure) => {
                warn!(notification_id = %notification.id, error = %failure, "failed to encode push frame");
                0
            }
        };

        let published = match self.publish(topic, notification).await {
            Ok(()) => true,
            Err(failure) => {
                warn!(notification_id = %notification.id, topic, error = %failure, "event publish failed");
                false
            }
        };

        debug!(
            notification_id = %notification.id,
            receiver_id = notification.receiver_id,
            live_recipients,
            published,
            "notification fanned out"
        );
        Delivery {
            live_recipients,
            published,
        }
    }

    async fn publish(&self, topic: &str, notification: &Notification) -> Result<(), PublishError> {
        let payload = EventEnvelope::new(&self.origin, topic, notification.clone()).encode()?;
        tokio::time::timeout(self.publish_timeout, self.publisher.publish(topic, payload))
            .await
            .map_err(|_| PublishError::Timeout(self.publish_timeout))?
    }
}

fn ensure_distinct(sender_id: i64, receiver_id: i64) -> NotificationResult<()> {
    if sender_id == receiver_id {
        return Err(NotificationError::invalid_input(
            "sender and receiver must differ",
        ));
    }
    Ok(())
}

/// Operators may act on any company; managers only on their own.
fn ensure_company_access(sender: &UserRecord, company_id: i64) -> NotificationResult<()> {
    if sender.role.is_operator() || sender.company_id == Some(company_id) {
        Ok(())
    } else {
        Err(NotificationError::forbidden(
            "sender does not manage the target company",
        ))
    }
}

fn already_answered(notification: &Notification) -> NotificationError {
    NotificationError::invalid_state(format!(
        "notification {} has already been answered",
        notification.id
    ))
}

fn pending(
    sender: &UserRecord,
    receiver: &UserRecord,
    kind: NotificationKind,
    title: String,
    content: String,
    target: &Target,
) -> NewNotification {
    NewNotification {
        sender_id: sender.id,
        receiver_id: receiver.id,
        kind,
        org_type: Some(target.org_type),
        status: Some(NotificationStatus::Pending),
        title,
        content,
        company_id: Some(target.company_id),
        company_name: Some(target.company_name.clone()),
        department_id: target.department.as_ref().map(|(id, _)| *id),
        department_name: target.department.as_ref().map(|(_, name)| name.clone()),
    }
}

/// The membership change an acceptance applies to `joiner`, checked against their current state.
fn membership_update(
    notification: &Notification,
    joiner: &UserRecord,
) -> NotificationResult<UserUpdate> {
    let corrupt = || {
        NotificationError::invalid_state(format!(
            "notification {} carries no organization",
            notification.id
        ))
    };

    match notification.org_type.ok_or_else(corrupt)? {
        OrgType::Company => {
            let company_id = notification.company_id.ok_or_else(corrupt)?;
            if joiner.company_id.is_some() {
                return Err(NotificationError::invalid_state(format!(
                    "user {} already belongs to a company",
                    joiner.id
                )));
            }
            Ok(UserUpdate::join_company(company_id))
        }
        OrgType::Department => {
            let department_id = notification.department_id.ok_or_else(corrupt)?;
            if joiner.company_id != notification.company_id {
                return Err(NotificationError::invalid_state(format!(
                    "user {} is not in the department's company",
                    joiner.id
                )));
            }
            if joiner.in_department(department_id) {
                return Err(NotificationError::invalid_state(format!(
                    "user {} already belongs to department {department_id}",
                    joiner.id
                )));
            }
            Ok(UserUpdate::join_department(department_id))
        }
    }
}
