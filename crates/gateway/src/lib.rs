//! # Link Gateway
//!
//! HTTP and WebSocket surface of the backend.
//!
//! - **REST**: user profiles and notifications under `/api`, bearer-token protected
//! - **WebSocket**: `/ws/chat` (room chat) and `/ws/user` (notification pushes)
//! - **Errors**: every domain error maps to a status code and `{error, message}`
//!
//! ```rust,ignore
//! let state = GatewayState::new(authenticator, users, notifications, sessions);
//! let app = link_gateway::create_router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod adapters;
pub mod error;
pub mod middleware;
pub mod rest;
pub mod state;
pub mod websocket;

pub use adapters::{RoomDirectory, TokenAuthenticator};
pub use error::{ErrorResponse, GatewayError, GatewayResult};
pub use middleware::auth_middleware;
pub use state::GatewayState;

use std::sync::Arc;

use axum::{http::Method, middleware as axum_middleware, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        rest::health::health_check,
        rest::users::get_user,
        rest::users::update_user,
        rest::notifications::list_notifications,
        rest::notifications::create_mention,
        rest::notifications::create_invite,
        rest::notifications::create_request,
        rest::notifications::respond,
        rest::notifications::mark_read,
    ),
    components(schemas(
        ErrorResponse,
        rest::health::HealthResponse,
        rest::users::UserResponse,
        rest::users::OrgRefResponse,
        rest::users::UpdateUserRequest,
        rest::notifications::NotificationResponse,
        rest::notifications::DeliveryResponse,
        rest::notifications::CreatedResponse,
        rest::notifications::RespondedResponse,
        rest::notifications::CreateMentionRequest,
        rest::notifications::CreateInviteRequest,
        rest::notifications::CreateJoinRequest,
        rest::notifications::RespondRequest,
    )),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Users", description = "User profiles"),
        (name = "Notifications", description = "Mentions, invites, join requests and answers"),
    )
)]
pub struct ApiDoc;

/// Create the main application router with all routes
pub fn create_router(state: GatewayState) -> Router {
    let state = Arc::new(state);

    let api = rest::create_rest_routes().layer(axum_middleware::from_fn_with_state(
        state.clone(),
        auth_middleware,
    ));

    Router::new()
        .route("/health", get(rest::health::health_check))
        .nest("/api", api)
        .merge(websocket::create_websocket_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT])
                .allow_headers(Any),
        )
        .layer(middleware::create_trace_middleware())
}
