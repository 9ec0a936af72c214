//! Error types for the OAuth flow

use std::time::Duration;
use thiserror::Error;

/// Result type alias for OAuth operations
pub type Result<T> = std::result::Result<T, OAuthError>;

/// OAuth error types
#[derive(Error, Debug)]
pub enum OAuthError {
    #[error("Timed out waiting for authorization after {0:?}")]
    Timeout(Duration),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Token request failed with HTTP {status}: {body}")]
    TokenExchange { status: u16, body: String },

    #[error("Invalid OAuth configuration: {0}")]
    Config(String),

    #[error("Redirect listener error: {0}")]
    Listener(String),

    #[error("Could not open browser: {0}")]
    Browser(String),

    #[error("Token storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
