//! Authentication: sessions, access tokens and the auth endpoint

pub mod client;
pub mod jwt;
pub mod session;

pub use client::AuthClient;
pub use session::{Session, SessionGuard, SessionSource, SessionStore};

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No active session")]
    NotAuthenticated,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Auth request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Auth endpoint rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },
}
