//! Error types for document loading and endpoint compilation

use thiserror::Error;

/// Result type alias for document loading
pub type LoadResult<T> = std::result::Result<T, LoadError>;

/// Result type alias for reference resolution
pub type ResolveResult<T> = std::result::Result<T, ResolveError>;

/// Fatal errors raised while loading a document
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to fetch OpenAPI document: {0}")]
    FetchError(String),

    #[error("Could not parse the document as a file path, JSON, or YAML")]
    Unparsable,

    #[error("Invalid document format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported document version: {0}")]
    UnsupportedVersion(String),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors raised while resolving a `$ref` pointer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Only local references are supported, got: {0}")]
    Unsupported(String),

    #[error("Invalid reference path: {0}")]
    InvalidPath(String),

    #[error("Circular reference detected: {0}")]
    Circular(String),
}

/// Per-operation compile failure; the operation is skipped
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("{method} {path}: {source}")]
    Reference {
        method: String,
        path: String,
        #[source]
        source: ResolveError,
    },

    #[error("{method} {path}: malformed operation: {reason}")]
    Malformed {
        method: String,
        path: String,
        reason: String,
    },
}

/// Errors raised while resolving the full URL of an endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("Missing required path parameter: {0}")]
    MissingPathParameter(String),

    #[error("No server URL available. Provide a server URL or ensure the endpoint has servers defined.")]
    MissingServerUrl,
}
