//! Supabase auth (GoTrue) client: sign-in, token refresh, sign-out

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{AuthError, Session, SessionStore};
use crate::config::Config;

/// Token grant response from `/auth/v1/token`
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Error body; older and newer auth servers use different field names
#[derive(Debug, Default, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl AuthErrorBody {
    fn into_message(self) -> String {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .or_else(|| {
                self.expires_in
                    .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
            });

        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            user_id: self.user.id,
            email: self.user.email,
            expires_at,
        }
    }
}

/// Auth endpoint client; publishes every session change to the store
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
    anon_key: String,
    sessions: SessionStore,
}

impl AuthClient {
    pub fn new(config: &Config, sessions: SessionStore) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
            sessions,
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    async fn token_grant<T: Serialize>(
        &self,
        grant_type: &str,
        body: &T,
    ) -> Result<Session, AuthError> {
        let response = self
            .client
            .post(self.auth_url("token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body: AuthErrorBody = response.json().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status,
                message: body.into_message(),
            });
        }

        let token: TokenResponse = response.json().await?;
        let session = token.into_session();
        self.sessions.set(session.clone());
        Ok(session)
    }

    /// Sign in with email and password
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let session = self
            .token_grant("password", &PasswordGrant { email, password })
            .await?;
        info!(user_id = %session.user_id, "Signed in");
        Ok(session)
    }

    /// Exchange the stored refresh token for a fresh session
    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        let refresh_token = self
            .sessions
            .get()
            .and_then(|s| s.refresh_token)
            .ok_or(AuthError::NotAuthenticated)?;

        self.token_grant(
            "refresh_token",
            &RefreshGrant {
                refresh_token: &refresh_token,
            },
        )
        .await
    }

    /// Revoke the session remotely and clear it locally.
    ///
    /// The local session is dropped even when the remote call fails.
    pub async fn sign_out(&self) {
        let Some(session) = self.sessions.get() else {
            return;
        };

        let result = self
            .client
            .post(self.auth_url("logout"))
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", session.access_token))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(status = response.status().as_u16(), "Logout rejected by auth endpoint")
            }
            Err(e) => warn!(error = %e, "Logout request failed"),
        }

        self.sessions.clear();
        info!(user_id = %session.user_id, "Signed out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_response_prefers_absolute_expiry() {
        let token: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "at",
            "refresh_token": "rt",
            "expires_in": 3600,
            "expires_at": 1_900_000_000,
            "user": { "id": "user-1", "email": "owner@example.com" }
        }))
        .unwrap();

        let session = token.into_session();
        assert_eq!(session.user_id, "user-1");
        assert_eq!(session.refresh_token.as_deref(), Some("rt"));
        assert_eq!(session.expires_at.map(|t| t.timestamp()), Some(1_900_000_000));
    }

    #[test]
    fn token_response_falls_back_to_relative_expiry() {
        let token: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "at",
            "expires_in": 60,
            "user": { "id": "user-1" }
        }))
        .unwrap();

        let session = token.into_session();
        assert!(session.is_live());
        assert!(session.expires_at.unwrap() <= Utc::now() + chrono::Duration::seconds(60));
    }

    #[test]
    fn error_body_message_fallbacks() {
        let old: AuthErrorBody = serde_json::from_value(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        }))
        .unwrap();
        assert_eq!(old.into_message(), "Invalid login credentials");

        let new: AuthErrorBody =
            serde_json::from_value(serde_json::json!({ "code": 400, "msg": "Email not confirmed" }))
                .unwrap();
        assert_eq!(new.into_message(), "Email not confirmed");
    }
}
