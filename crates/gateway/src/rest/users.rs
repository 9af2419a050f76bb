//! User profile REST endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use link_database::{OrgRef, UserRecord, UserUpdate};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::error::{ErrorResponse, GatewayError, GatewayResult};
use crate::middleware::CurrentUser;
use crate::state::GatewayState;

#[derive(Debug, Serialize, ToSchema)]
pub struct OrgRefResponse {
    pub id: i64,
    pub name: String,
}

impl From<OrgRef> for OrgRefResponse {
    fn from(org: OrgRef) -> Self {
        Self {
            id: org.id,
            name: org.name,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub nickname: String,
    pub phone: Option<String>,
    pub role: String,
    pub image: Option<String>,
    pub birthday: Option<String>,
    pub is_subscribed: bool,
    pub company_id: Option<i64>,
    pub departments: Vec<OrgRefResponse>,
    pub teams: Vec<OrgRefResponse>,
    pub entry_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub is_online: bool,
}

impl From<UserRecord> for UserResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            nickname: user.nickname,
            phone: user.phone,
            role: user.role.as_str().to_string(),
            image: user.image,
            birthday: user.birthday,
            is_subscribed: user.is_subscribed,
            company_id: user.company_id,
            departments: user.departments.into_iter().map(Into::into).collect(),
            teams: user.teams.into_iter().map(Into::into).collect(),
            entry_date: user.entry_date,
            created_at: user.created_at,
            updated_at: user.updated_at,
            is_online: user.is_online,
        }
    }
}

/// Profile fields a user may change. Memberships change only through invites and requests.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub nickname: Option<String>,
    pub phone: Option<String>,
    pub image: Option<String>,
    pub birthday: Option<String>,
    pub is_subscribed: Option<bool>,
    pub entry_date: Option<String>,
}

impl From<UpdateUserRequest> for UserUpdate {
    fn from(request: UpdateUserRequest) -> Self {
        UserUpdate {
            name: request.name,
            nickname: request.nickname,
            phone: request.phone,
            image: request.image,
            birthday: request.birthday,
            is_subscribed: request.is_subscribed,
            entry_date: request.entry_date,
            ..UserUpdate::default()
        }
    }
}

pub fn create_user_routes() -> Router<Arc<GatewayState>> {
    Router::new().route("/users/:user_id", get(get_user).put(update_user))
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}",
    tag = "Users",
    params(("user_id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User profile", body = UserResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
pub async fn get_user(
    Path(user_id): Path<i64>,
    State(state): State<Arc<GatewayState>>,
    _caller: CurrentUser,
) -> GatewayResult<Json<UserResponse>> {
    let user = state.users.get(user_id).await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    put,
    path = "/api/users/{user_id}",
    tag = "Users",
    params(("user_id" = i64, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserResponse),
        (status = 400, description = "Empty update", body = ErrorResponse),
        (status = 403, description = "Not your profile", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
pub async fn update_user(
    Path(user_id): Path<i64>,
    State(state): State<Arc<GatewayState>>,
    caller: CurrentUser,
    Json(request): Json<UpdateUserRequest>,
) -> GatewayResult<Json<UserResponse>> {
    if caller.user_id != user_id {
        let acting = state.users.get(caller.user_id).await?;
        if !acting.role.is_operator() {
            return Err(GatewayError::AuthorizationFailed(
                "only operators can edit other users".to_string(),
            ));
        }
    }

    state.users.update(user_id, &request.into()).await?;
    info!(user_id, editor = caller.user_id, "profile updated");

    // The commit is visible in the store at once; the cache mirror catches up in the background.
    let user = state.users.get_fresh(user_id).await?;
    Ok(Json(user.into()))
}
