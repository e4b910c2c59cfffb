//! Configuration module - environment variable parsing

use std::env;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Supabase project URL
    pub supabase_url: String,
    /// Supabase anonymous key, sent as `apikey` on every request
    pub supabase_anon_key: String,
    /// Supabase JWT secret; when set, access tokens are signature-checked
    pub supabase_jwt_secret: Option<String>,

    /// Pre-issued access token to start the session with
    pub access_token: Option<String>,
    /// Password sign-in credentials
    pub email: Option<String>,
    pub password: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            supabase_url: env::var("SUPABASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_URL"))?,
            supabase_anon_key: env::var("SUPABASE_ANON_KEY")
                .map_err(|_| ConfigError::Missing("SUPABASE_ANON_KEY"))?,
            supabase_jwt_secret: optional("SUPABASE_JWT_SECRET"),

            access_token: optional("SUPABASE_ACCESS_TOKEN"),
            email: optional("SUPABASE_EMAIL"),
            password: optional("SUPABASE_PASSWORD"),
        })
    }

    /// Config pointing at a given project, with everything optional unset
    pub fn for_project(supabase_url: &str, supabase_anon_key: &str) -> Self {
        Self {
            log_level: "info".to_string(),
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            supabase_anon_key: supabase_anon_key.to_string(),
            supabase_jwt_secret: None,
            access_token: None,
            email: None,
            password: None,
        }
    }

    /// Password credentials, if both halves are configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.email, &self.password) {
            (Some(email), Some(password)) => Some((email, password)),
            _ => None,
        }
    }
}

/// Empty values count as unset
fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
