//! Notification REST endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use link_notifications::{
    Created, Delivery, InviteRequest, JoinRequest, MentionRequest, Notification,
    NotificationQuery, NotificationStatus, OrgType, Responded,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::{ErrorResponse, GatewayError, GatewayResult};
use crate::middleware::CurrentUser;
use crate::state::GatewayState;

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationResponse {
    pub id: String,
    pub sender_id: i64,
    pub receiver_id: i64,
    /// `MENTION`, `INVITE`, `REQUEST` or `RESPONSE`.
    pub kind: String,
    pub org_type: Option<String>,
    pub status: Option<String>,
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

impl From<Notification> for NotificationResponse {
    fn from(notification: Notification) -> Self {
        Self {
            id: notification.id,
            sender_id: notification.sender_id,
            receiver_id: notification.receiver_id,
            kind: notification.kind.to_string(),
            org_type: notification.org_type.map(|org| org.to_string()),
            status: notification.status.map(|status| status.to_string()),
            is_read: notification.is_read,
            title: notification.title,
            content: notification.content,
            company_id: notification.company_id,
            company_name: notification.company_name,
            department_id: notification.department_id,
            department_name: notification.department_name,
            created_at: notification.created_at,
            updated_at: notification.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeliveryResponse {
    pub live_recipients: usize,
    pub published: bool,
}

impl From<Delivery> for DeliveryResponse {
    fn from(delivery: Delivery) -> Self {
        Self {
            live_recipients: delivery.live_recipients,
            published: delivery.published,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedResponse {
    pub notification: NotificationResponse,
    pub delivery: DeliveryResponse,
}

impl From<Created> for CreatedResponse {
    fn from(created: Created) -> Self {
        Self {
            notification: created.notification.into(),
            delivery: created.delivery.into(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RespondedResponse {
    pub notification: NotificationResponse,
    pub response: NotificationResponse,
    pub delivery: DeliveryResponse,
}

impl From<Responded> for RespondedResponse {
    fn from(responded: Responded) -> Self {
        Self {
            notification: responded.notification.into(),
            response: responded.response.into(),
            delivery: responded.delivery.into(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateMentionRequest {
    pub receiver_id: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateInviteRequest {
    pub receiver_id: i64,
    /// `COMPANY` or `DEPARTMENT`.
    pub invite_type: String,
    pub company_id: Option<i64>,
    pub department_id: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateJoinRequest {
    pub receiver_id: i64,
    /// `COMPANY` or `DEPARTMENT`.
    pub request_type: String,
    pub department_id: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RespondRequest {
    /// `ACCEPTED` or `REJECTED`.
    pub status: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListNotificationsQuery {
    pub unread_only: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub fn create_notification_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/mentions", post(create_mention))
        .route("/notifications/invites", post(create_invite))
        .route("/notifications/requests", post(create_request))
        .route("/notifications/:notification_id/status", put(respond))
        .route("/notifications/:notification_id/read", put(mark_read))
}

fn parse_org_type(raw: &str) -> GatewayResult<OrgType> {
    raw.trim()
        .to_uppercase()
        .parse()
        .map_err(|_| GatewayError::InvalidRequest(format!("unknown organization type {raw:?}")))
}

#[utoipa::path(
    get,
    path = "/api/notifications",
    tag = "Notifications",
    params(ListNotificationsQuery),
    responses(
        (status = 200, description = "The caller's notifications, newest first", body = Vec<NotificationResponse>),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn list_notifications(
    Query(params): Query<ListNotificationsQuery>,
    State(state): State<Arc<GatewayState>>,
    caller: CurrentUser,
) -> GatewayResult<Json<Vec<NotificationResponse>>> {
    let query = NotificationQuery {
        unread_only: params.unread_only.unwrap_or(false),
        limit: params.limit,
        offset: params.offset,
    };
    let notifications = state.notifications.list(caller.user_id, &query).await?;
    Ok(Json(notifications.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/api/notifications/mentions",
    tag = "Notifications",
    request_body = CreateMentionRequest,
    responses(
        (status = 201, description = "Mention created", body = CreatedResponse),
        (status = 404, description = "Receiver not found", body = ErrorResponse)
    )
)]
pub async fn create_mention(
    State(state): State<Arc<GatewayState>>,
    caller: CurrentUser,
    Json(request): Json<CreateMentionRequest>,
) -> GatewayResult<(StatusCode, Json<CreatedResponse>)> {
    let created = state
        .notifications
        .create_mention(
            caller.user_id,
            &MentionRequest {
                receiver_id: request.receiver_id,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

#[utoipa::path(
    post,
    path = "/api/notifications/invites",
    tag = "Notifications",
    request_body = CreateInviteRequest,
    responses(
        (status = 201, description = "Invite created", body = CreatedResponse),
        (status = 400, description = "Receiver cannot join the organization", body = ErrorResponse),
        (status = 403, description = "Caller may not invite", body = ErrorResponse)
    )
)]
pub async fn create_invite(
    State(state): State<Arc<GatewayState>>,
    caller: CurrentUser,
    Json(request): Json<CreateInviteRequest>,
) -> GatewayResult<(StatusCode, Json<CreatedResponse>)> {
    let invite = InviteRequest {
        receiver_id: request.receiver_id,
        invite_type: parse_org_type(&request.invite_type)?,
        company_id: request.company_id,
        department_id: request.department_id,
    };
    let created = state.notifications.create_invite(caller.user_id, &invite).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

#[utoipa::path(
    post,
    path = "/api/notifications/requests",
    tag = "Notifications",
    request_body = CreateJoinRequest,
    responses(
        (status = 201, description = "Join request created", body = CreatedResponse),
        (status = 400, description = "Caller cannot join the organization", body = ErrorResponse),
        (status = 403, description = "Caller may not send requests", body = ErrorResponse)
    )
)]
pub async fn create_request(
    State(state): State<Arc<GatewayState>>,
    caller: CurrentUser,
    Json(request): Json<CreateJoinRequest>,
) -> GatewayResult<(StatusCode, Json<CreatedResponse>)> {
    let join = JoinRequest {
        receiver_id: request.receiver_id,
        request_type: parse_org_type(&request.request_type)?,
        department_id: request.department_id,
    };
    let created = state.notifications.create_request(caller.user_id, &join).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

#[utoipa::path(
    put,
    path = "/api/notifications/{notification_id}/status",
    tag = "Notifications",
    params(("notification_id" = String, Path, description = "Notification ID")),
    request_body = RespondRequest,
    responses(
        (status = 200, description = "Answer recorded", body = RespondedResponse),
        (status = 400, description = "Already answered", body = ErrorResponse),
        (status = 403, description = "Caller is not the receiver", body = ErrorResponse),
        (status = 404, description = "Notification not found", body = ErrorResponse)
    )
)]
pub async fn respond(
    Path(notification_id): Path<String>,
    State(state): State<Arc<GatewayState>>,
    caller: CurrentUser,
    Json(request): Json<RespondRequest>,
) -> GatewayResult<Json<RespondedResponse>> {
    let decision: NotificationStatus = request
        .status
        .trim()
        .to_uppercase()
        .parse()
        .map_err(|_| GatewayError::InvalidRequest(format!("unknown status {:?}", request.status)))?;

    let responded = state
        .notifications
        .respond(&notification_id, caller.user_id, decision)
        .await?;
    Ok(Json(responded.into()))
}

#[utoipa::path(
    put,
    path = "/api/notifications/{notification_id}/read",
    tag = "Notifications",
    params(("notification_id" = String, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Notification is read", body = NotificationResponse),
        (status = 403, description = "Caller is not the receiver", body = ErrorResponse),
        (status = 404, description = "Notification not found", body = ErrorResponse)
    )
)]
pub async fn mark_read(
    Path(notification_id): Path<String>,
    State(state): State<Arc<GatewayState>>,
    caller: CurrentUser,
) -> GatewayResult<Json<NotificationResponse>> {
    let notification = state
        .notifications
        .mark_read(&notification_id, caller.user_id)
        .await?;
    Ok(Json(notification.into()))
}
