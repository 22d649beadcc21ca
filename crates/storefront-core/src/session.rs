//! Session Lookup
//!
//! Sessions are issued by the external auth library. This module only
//! resolves the token carried by a request to the signed-in user.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

/// Cookie names the auth library stores its session token under
pub const SESSION_COOKIE_NAMES: [&str; 2] = [
    "better-auth.session_token",
    "__Secure-better-auth.session_token",
];

/// Opaque session token
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generate a fresh random token
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract the session token from a raw `Cookie` header value.
    ///
    /// The cookie value is `<token>.<signature>`; only the token part is
    /// returned.
    pub fn from_cookie_header(header: &str) -> Option<Self> {
        header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| SESSION_COOKIE_NAMES.contains(name))
            .map(|(_, value)| value.split('.').next().unwrap_or(value))
            .filter(|token| !token.is_empty())
            .map(Self::from_string)
    }

    /// Extract a token from an `Authorization: Bearer <token>` value
    pub fn from_bearer(header: &str) -> Option<Self> {
        header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(Self::from_string)
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The signed-in user behind a session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    /// User id
    pub user_id: String,

    pub email: String,

    /// Display name
    pub name: String,

    pub expires_at: DateTime<Utc>,
}

impl UserSession {
    /// Session valid for `ttl` from now
    pub fn new(
        user_id: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            name: name.into(),
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Resolves session tokens to users
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up the session for a token. Expired sessions resolve to `None`.
    async fn resolve(&self, token: &SessionToken) -> Result<Option<UserSession>>;
}

/// In-memory session store (for development and tests)
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionToken, UserSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session and return its token
    pub async fn issue(&self, session: UserSession) -> SessionToken {
        let token = SessionToken::generate();
        self.sessions.write().await.insert(token.clone(), session);
        token
    }

    /// Drop a session
    pub async fn revoke(&self, token: &SessionToken) {
        self.sessions.write().await.remove(token);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn resolve(&self, token: &SessionToken) -> Result<Option<UserSession>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(token).filter(|s| !s.is_expired()).cloned())
    }
}
