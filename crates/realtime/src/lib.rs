//! # Link Realtime
//!
//! In-process delivery of live pushes over persistent sockets.
//!
//! - [`ConnectionRegistry`] tracks live connections per user and per room.
//! - [`Hub`] owns the registry, runs each connection's receive loop and fans
//!   frames out to users and rooms.
//! - [`ChatSessionValidator`] admits sockets after a first-frame handshake.
//!
//! A `Hub` is an ordinary value: construct one at start-up and hand clones to
//! whatever needs to push. Tests build as many isolated hubs as they like.

pub mod connection;
pub mod frame;
pub mod hub;
pub mod registry;
pub mod session;

pub use connection::{ConnectionHandle, ConnectionId, DeliveryError, OutboundQueue};
pub use frame::{ChatBroadcast, InboundChatFrame, PushFrame, CHAT_FRAME, NOTIFICATION_FRAME};
pub use hub::{ExitReason, Hub, RegistrationGuard};
pub use registry::{ConnectionRegistry, NoopPresence, PresenceSink};
pub use session::{
    Admission, AuthRejected, Authenticate, ChatSessionValidator, HandshakeError, LookupFailed,
    RoomLookup,
};

pub type UserId = i64;
pub type RoomId = i64;
