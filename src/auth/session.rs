//! Session state and the guard in front of every mutation

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use super::jwt::{decode_claims, verify_jwt};
use super::AuthError;

/// An authenticated session as issued by the auth endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Build a session from a bare access token.
    ///
    /// With a secret the signature is checked; without one the claims are
    /// only decoded.
    pub fn from_access_token(token: &str, secret: Option<&str>) -> Result<Self, AuthError> {
        let claims = match secret {
            Some(secret) => verify_jwt(token, secret)?,
            None => decode_claims(token)?,
        };

        Ok(Self {
            access_token: token.to_string(),
            refresh_token: None,
            user_id: claims.sub,
            email: claims.email,
            expires_at: DateTime::from_timestamp(claims.exp, 0),
        })
    }

    /// A session past its expiry no longer authorizes writes
    pub fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |exp| exp > Utc::now())
    }
}

/// Anything that can answer "who is signed in right now"
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn current_session(&self) -> Option<Session>;
}

/// Locally held session, observable by subscribers
#[derive(Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<Option<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Publish a new session (sign-in or token refresh)
    pub fn set(&self, session: Session) {
        debug!(user_id = %session.user_id, "Session stored");
        self.tx.send_replace(Some(session));
    }

    /// Drop the current session (sign-out)
    pub fn clear(&self) {
        if self.tx.send_replace(None).is_some() {
            debug!("Session cleared");
        }
    }

    /// Current session, live or not
    pub fn get(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    /// Observe presence transitions
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionSource for SessionStore {
    async fn current_session(&self) -> Option<Session> {
        self.get()
    }
}

/// Precondition check for authenticated mutations
#[derive(Clone)]
pub struct SessionGuard {
    source: Arc<dyn SessionSource>,
}

impl SessionGuard {
    pub fn new(source: Arc<dyn SessionSource>) -> Self {
        Self { source }
    }

    /// Succeeds only when a live session exists
    pub async fn require_session(&self) -> Result<Session, AuthError> {
        match self.source.current_session().await {
            Some(session) if session.is_live() => Ok(session),
            Some(_) => Err(AuthError::TokenExpired),
            None => Err(AuthError::NotAuthenticated),
        }
    }
}
