//! Socket admission.
//!
//! The handshake precedes any authenticated request context, so the token is
//! read from the first inbound frame rather than a header. A failed handshake
//! ends with a close frame and leaves the registry untouched.

use std::borrow::Cow;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::hub::Hub;
use crate::{RoomId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct AuthRejected(pub String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct LookupFailed(pub String);

/// `authenticate(token) -> subject`.
#[async_trait]
pub trait Authenticate: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<UserId, AuthRejected>;
}

/// `lookupRoom(roomId) -> exists`.
#[async_trait]
pub trait RoomLookup: Send + Sync {
    async fn room_exists(&self, room_id: RoomId) -> Result<bool, LookupFailed>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("invalid initial message: {0}")]
    Malformed(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("invalid room id: {0}")]
    InvalidRoom(String),
    #[error("room {0} does not exist")]
    UnknownRoom(RoomId),
    #[error("room lookup failed: {0}")]
    Lookup(String),
    #[error("handshake timed out")]
    TimedOut,
    #[error("socket closed before handshake")]
    Closed,
}

impl HandshakeError {
    pub fn close_frame(&self) -> CloseFrame<'static> {
        let (code, reason) = match self {
            HandshakeError::Malformed(_) | HandshakeError::TimedOut => {
                (close_code::INVALID, "Invalid initial message")
            }
            HandshakeError::Unauthorized(_) => (close_code::POLICY, "Unauthorized"),
            HandshakeError::InvalidRoom(_) | HandshakeError::UnknownRoom(_) => {
                (close_code::POLICY, "Invalid roomId")
            }
            HandshakeError::Lookup(_) => (close_code::ERROR, "Internal error"),
            HandshakeError::Closed => (close_code::NORMAL, "Closed"),
        };
        CloseFrame {
            code,
            reason: Cow::Borrowed(reason),
        }
    }
}

/// Identity and room granted by a successful handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub user_id: UserId,
    pub room_id: Option<RoomId>,
}

#[derive(Debug, Deserialize)]
struct HandshakeFrame {
    token: String,
    #[serde(default, rename = "roomId")]
    room_id: Option<RoomIdValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RoomIdValue {
    Number(i64),
    Text(String),
}

impl RoomIdValue {
    fn parse(self) -> Result<RoomId, HandshakeError> {
        let id = match self {
            RoomIdValue::Number(id) => id,
            RoomIdValue::Text(text) => text
                .trim()
                .parse::<RoomId>()
                .map_err(|_| HandshakeError::InvalidRoom(text))?,
        };
        if id <= 0 {
            return Err(HandshakeError::InvalidRoom(id.to_string()));
        }
        Ok(id)
    }
}

pub struct ChatSessionValidator {
    hub: Hub,
    authenticator: Arc<dyn Authenticate>,
    rooms: Arc<dyn RoomLookup>,
    handshake_timeout: Duration,
}

impl ChatSessionValidator {
    pub fn new(
        hub: Hub,
        authenticator: Arc<dyn Authenticate>,
        rooms: Arc<dyn RoomLookup>,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            hub,
            authenticator,
            rooms,
            handshake_timeout,
        }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Validates a chat handshake frame: `{token, roomId}`.
    pub async fn validate_chat(&self, first_frame: &str) -> Result<Admission, HandshakeError> {
        let frame = parse_frame(first_frame)?;
        let user_id = self.authenticate(&frame.token).await?;

        let room_id = frame
            .room_id
            .ok_or_else(|| HandshakeError::InvalidRoom("missing".to_string()))?
            .parse()?;

        let exists = self
            .rooms
            .room_exists(room_id)
            .await
            .map_err(|error| HandshakeError::Lookup(error.0))?;
        if !exists {
            return Err(HandshakeError::UnknownRoom(room_id));
        }

        Ok(Admission {
            user_id,
            room_id: Some(room_id),
        })
    }

    /// Validates a user-channel handshake frame: `{token}`.
    pub async fn validate_user(&self, first_frame: &str) -> Result<Admission, HandshakeError> {
        let frame = parse_frame(first_frame)?;
        let user_id = self.authenticate(&frame.token).await?;
        Ok(Admission {
            user_id,
            room_id: None,
        })
    }

    async fn authenticate(&self, token: &str) -> Result<UserId, HandshakeError> {
        self.authenticator
            .authenticate(token)
            .await
            .map_err(|rejected| HandshakeError::Unauthorized(rejected.0))
    }

    pub async fn serve_chat_socket(&self, socket: WebSocket) {
        let (sink, stream) = socket.split();
        self.serve_chat(sink, stream).await;
    }

    pub async fn serve_user_socket(&self, socket: WebSocket) {
        let (sink, stream) = socket.split();
        self.serve_user(sink, stream).await;
    }

    pub async fn serve_chat<S, E, W>(&self, sink: W, stream: S)
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
        W: Sink<Message> + Unpin + Send + 'static,
        W::Error: Display + Send,
    {
        self.serve(sink, stream, SessionKind::Chat).await;
    }

    pub async fn serve_user<S, E, W>(&self, sink: W, stream: S)
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
        W: Sink<Message> + Unpin + Send + 'static,
        W::Error: Display + Send,
    {
        self.serve(sink, stream, SessionKind::User).await;
    }

    async fn serve<S, E, W>(&self, mut sink: W, mut stream: S, kind: SessionKind)
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
        W: Sink<Message> + Unpin + Send + 'static,
        W::Error: Display + Send,
    {
        let admission =
            match tokio::time::timeout(self.handshake_timeout, first_text(&mut stream)).await {
                Err(_) => Err(HandshakeError::TimedOut),
                Ok(Err(error)) => Err(error),
                Ok(Ok(text)) => match kind {
                    SessionKind::Chat => self.validate_chat(&text).await,
                    SessionKind::User => self.validate_user(&text).await,
                },
            };

        let admission = match admission {
            Ok(admission) => admission,
            Err(error) => {
                warn!(%error, ?kind, "handshake rejected");
                if error != HandshakeError::Closed {
                    let _ = sink.send(Message::Close(Some(error.close_frame()))).await;
                }
                let _ = sink.close().await;
                return;
            }
        };

        info!(
            user_id = admission.user_id,
            room_id = ?admission.room_id,
            ?kind,
            "handshake accepted"
        );

        let (connection, outbound) = self.hub.open_connection(admission.user_id);
        let guard = self.hub.admit(connection, admission.room_id);
        self.hub.run_connection(guard, outbound, sink, stream).await;
    }
}

#[derive(Debug, Clone, Copy)]
enum SessionKind {
    Chat,
    User,
}

fn parse_frame(text: &str) -> Result<HandshakeFrame, HandshakeError> {
    serde_json::from_str::<HandshakeFrame>(text)
        .map_err(|error| HandshakeError::Malformed(error.to_string()))
}

async fn first_text<S, E>(stream: &mut S) -> Result<String, HandshakeError>
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => return Ok(text),
            Ok(Message::Binary(_)) => {
                return Err(HandshakeError::Malformed("binary frame".to_string()))
            }
            Ok(Message::Close(_)) => return Err(HandshakeError::Closed),
            Ok(_) => continue,
            Err(error) => {
                debug!(%error, "socket failed during handshake");
                return Err(HandshakeError::Closed);
            }
        }
    }
    Err(HandshakeError::Closed)
}
