//! Token verification for HTTP and WebSocket callers.
//!
//! Tokens are HS256 JWTs whose `sub` claim is the numeric user id. Callers may
//! pass the raw token or an `Authorization` style `Bearer <token>` value.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use link_config::AuthConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token subject is not a user id")]
    InvalidSubject,
    #[error("token issuance failed: {0}")]
    Issue(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
    pub jti: String,
}

/// Authenticated subject extracted from a verified token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: i64,
}

#[derive(Clone)]
pub struct JwtAuthenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    token_ttl_seconds: u64,
}

impl JwtAuthenticator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.issuer.clone(),
            token_ttl_seconds: config.token_ttl_seconds,
        }
    }

    /// `authenticate(token) -> subject`.
    pub fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let token = strip_bearer(token);
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|error| {
            match error.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(error.to_string()),
            }
        })?;

        let user_id = data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| AuthError::InvalidSubject)?;

        debug!(user_id, "token verified");
        Ok(AuthenticatedUser { user_id })
    }

    pub fn issue_token(&self, user_id: i64) -> Result<String, AuthError> {
        self.issue_token_with_ttl(user_id, self.token_ttl_seconds as i64)
    }

    /// Negative TTLs produce already-expired tokens.
    pub fn issue_token_with_ttl(&self, user_id: i64, ttl_seconds: i64) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: now.saturating_add(ttl_seconds).max(0) as usize,
            iat: now.max(0) as usize,
            iss: self.issuer.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|error| AuthError::Issue(error.to_string()))
    }
}

fn strip_bearer(token: &str) -> &str {
    let token = token.trim();
    token.strip_prefix(BEARER_PREFIX).unwrap_or(token).trim()
}
