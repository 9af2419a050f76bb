//! Bindings of the realtime handshake seams to the token verifier and the room table.

use async_trait::async_trait;
use link_auth::JwtAuthenticator;
use link_database::ChatRoomRepository;
use link_realtime::{AuthRejected, Authenticate, LookupFailed, RoomLookup};

pub struct TokenAuthenticator(pub JwtAuthenticator);

#[async_trait]
impl Authenticate for TokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<i64, AuthRejected> {
        self.0
            .authenticate(token)
            .map(|user| user.user_id)
            .map_err(|error| AuthRejected(error.to_string()))
    }
}

pub struct RoomDirectory(pub ChatRoomRepository);

#[async_trait]
impl RoomLookup for RoomDirectory {
    async fn room_exists(&self, room_id: i64) -> Result<bool, LookupFailed> {
        self.0
            .exists(room_id)
            .await
            .map_err(|error| LookupFailed(error.to_string()))
    }
}
