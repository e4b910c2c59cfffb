//! Supabase REST (PostgREST) client, acting as the signed-in user

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::query::Query;
use crate::auth::SessionStore;
use crate::config::Config;
use crate::util::time::Timer;

/// PostgREST code for "JSON object requested, multiple (or no) rows returned"
pub const CODE_NOT_FOUND: &str = "PGRST116";
/// Postgres `insufficient_privilege`, raised by row-level security
pub const CODE_PERMISSION_DENIED: &str = "42501";

/// Table-style record endpoint.
///
/// Rows travel as JSON values; typed decoding happens in the repositories.
#[async_trait]
pub trait TableApi: Send + Sync {
    /// Rows matching the query
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, SupabaseError>;

    /// Exactly one row matching the query, `None` when there is none
    async fn select_one(&self, table: &str, query: &Query)
        -> Result<Option<Value>, SupabaseError>;

    /// Insert a row and return it as stored
    async fn insert(&self, table: &str, row: &Value) -> Result<Value, SupabaseError>;

    /// Patch matching rows and return them as stored
    async fn update(
        &self,
        table: &str,
        query: &Query,
        patch: &Value,
    ) -> Result<Vec<Value>, SupabaseError>;

    /// Delete matching rows and return what was deleted
    async fn delete(&self, table: &str, query: &Query) -> Result<Vec<Value>, SupabaseError>;
}

/// Supabase client for client-side database operations.
/// Uses the anon key plus the user's access token, so row-level security applies.
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    sessions: SessionStore,
}

impl SupabaseClient {
    pub fn new(config: &Config, sessions: SessionStore) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
            sessions,
        }
    }

    /// Get the REST API URL for a table
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Attach the auth headers; the bearer is the session token when signed in.
    /// `.json()` sets the content type on requests that carry a body.
    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .sessions
            .get()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.anon_key.clone());

        request
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }

    async fn send(
        &self,
        request: RequestBuilder,
        table: &str,
        method: &'static str,
    ) -> Result<Response, SupabaseError> {
        let timer = Timer::new();
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        debug!(
            table,
            method,
            status = response.status().as_u16(),
            elapsed_ms = timer.elapsed_ms(),
            "Supabase request"
        );

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SupabaseError::from_response(status, &body));
        }

        Ok(response)
    }

    async fn rows(response: Response) -> Result<Vec<Value>, SupabaseError> {
        response.json().await.map_err(SupabaseError::Parse)
    }
}

#[async_trait]
impl TableApi for SupabaseClient {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, SupabaseError> {
        let request = self.client.get(self.rest_url(table)).query(&query.to_params());
        let response = self.send(request, table, "GET").await?;
        Self::rows(response).await
    }

    async fn select_one(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<Option<Value>, SupabaseError> {
        let request = self
            .client
            .get(self.rest_url(table))
            .query(&query.to_params())
            .header("Accept", "application/vnd.pgrst.object+json");

        match self.send(request, table, "GET").await {
            Ok(response) => response.json().await.map(Some).map_err(SupabaseError::Parse),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn insert(&self, table: &str, row: &Value) -> Result<Value, SupabaseError> {
        let request = self
            .client
            .post(self.rest_url(table))
            .header("Prefer", "return=representation")
            .json(row);

        let response = self.send(request, table, "POST").await?;

        // PostgREST returns an array, get first element
        Self::rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or(SupabaseError::NoRowReturned)
    }

    async fn update(
        &self,
        table: &str,
        query: &Query,
        patch: &Value,
    ) -> Result<Vec<Value>, SupabaseError> {
        let request = self
            .client
            .patch(self.rest_url(table))
            .query(&query.to_params())
            .header("Prefer", "return=representation")
            .json(patch);

        let response = self.send(request, table, "PATCH").await?;
        Self::rows(response).await
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<Vec<Value>, SupabaseError> {
        let request = self
            .client
            .delete(self.rest_url(table))
            .query(&query.to_params())
            .header("Prefer", "return=representation");

        let response = self.send(request, table, "DELETE").await?;
        Self::rows(response).await
    }
}

/// PostgREST error body
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Supabase errors
#[derive(Debug, thiserror::Error)]
pub enum SupabaseError {
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("API error (status {status}, code {code:?}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Failed to parse response: {0}")]
    Parse(#[source] reqwest::Error),

    #[error("No row returned from insert")]
    NoRowReturned,
}

impl SupabaseError {
    /// Build an API error from a status and a (possibly non-JSON) body
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
        let message = match (parsed.message, parsed.details) {
            (Some(message), Some(details)) => format!("{} ({})", message, details),
            (Some(message), None) => message,
            (None, _) if !body.is_empty() => body.to_string(),
            (None, _) => status.canonical_reason().unwrap_or("unknown").to_string(),
        };

        SupabaseError::Api {
            status: status.as_u16(),
            code: parsed.code,
            message,
        }
    }

    /// Machine-readable error code, if the backend sent one
    pub fn code(&self) -> Option<&str> {
        match self {
            SupabaseError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// "Row not found" signal
    pub fn is_not_found(&self) -> bool {
        self.code() == Some(CODE_NOT_FOUND)
    }

    /// Authorization rejection (row-level security or role grants)
    pub fn is_permission_denied(&self) -> bool {
        match self {
            SupabaseError::Api { status, code, .. } => {
                code.as_deref() == Some(CODE_PERMISSION_DENIED) || *status == 403
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_not_found_body() {
        let err = SupabaseError::from_response(
            StatusCode::NOT_ACCEPTABLE,
            r#"{"code":"PGRST116","details":"The result contains 0 rows","hint":null,"message":"JSON object requested, multiple (or no) rows returned"}"#,
        );
        assert!(err.is_not_found());
        assert!(!err.is_permission_denied());
        assert!(err.to_string().contains("0 rows"));
    }

    #[test]
    fn parses_permission_denied_body() {
        let err = SupabaseError::from_response(
            StatusCode::UNAUTHORIZED,
            r#"{"code":"42501","details":null,"hint":null,"message":"new row violates row-level security policy for table \"products\""}"#,
        );
        assert!(err.is_permission_denied());
        assert_eq!(err.code(), Some("42501"));
    }

    #[test]
    fn forbidden_status_without_code_is_permission_denied() {
        let err = SupabaseError::from_response(StatusCode::FORBIDDEN, "");
        assert!(err.is_permission_denied());
        assert!(err.to_string().contains("Forbidden"));
    }

    #[test]
    fn non_json_body_is_kept_as_message() {
        let err = SupabaseError::from_response(StatusCode::BAD_GATEWAY, "upstream timed out");
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("upstream timed out"));
    }
}
