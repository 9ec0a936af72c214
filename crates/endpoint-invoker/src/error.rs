//! Error types for request construction and dispatch

use oauth_flow::OAuthError;
use openapi_endpoints::UrlError;
use thiserror::Error;

/// Result type alias for invocations
pub type Result<T> = std::result::Result<T, InvokeError>;

/// Invocation error types. Validation variants are raised before any
/// network traffic.
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("Missing required path parameter: {0}")]
    MissingPathParameter(String),

    #[error("Missing required query parameter: {0}")]
    MissingQueryParameter(String),

    #[error("Missing required header parameter: {0}")]
    MissingHeaderParameter(String),

    #[error("Missing required form parameter: {0}")]
    MissingFormParameter(String),

    #[error("Request body is required but was not provided")]
    MissingRequestBody,

    #[error("Bearer token is required but was not provided")]
    MissingBearerToken,

    #[error("No server URL available. Provide a server URL or ensure the endpoint has servers defined.")]
    MissingServerUrl,

    #[error("Invalid header {0}")]
    InvalidHeader(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("OAuth error: {0}")]
    OAuth(#[from] OAuthError),

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<UrlError> for InvokeError {
    fn from(err: UrlError) -> Self {
        match err {
            UrlError::MissingPathParameter(name) => InvokeError::MissingPathParameter(name),
            UrlError::MissingServerUrl => InvokeError::MissingServerUrl,
        }
    }
}
