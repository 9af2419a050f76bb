//! Shared application state for the gateway

use std::sync::Arc;

use link_auth::JwtAuthenticator;
use link_notifications::NotificationEngine;
use link_realtime::{ChatSessionValidator, Hub};
use link_users::UserStateCache;

/// Services reachable from every handler.
#[derive(Clone)]
pub struct GatewayState {
    pub authenticator: Arc<JwtAuthenticator>,
    pub users: Arc<UserStateCache>,
    pub notifications: Arc<NotificationEngine>,
    pub sessions: Arc<ChatSessionValidator>,
}

impl GatewayState {
    pub fn new(
        authenticator: Arc<JwtAuthenticator>,
        users: Arc<UserStateCache>,
        notifications: Arc<NotificationEngine>,
        sessions: Arc<ChatSessionValidator>,
    ) -> Self {
        Self {
            authenticator,
            users,
            notifications,
            sessions,
        }
    }

    pub fn hub(&self) -> &Hub {
        self.sessions.hub()
    }
}
