//! Document loading from files, raw text, URLs or parsed values

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use crate::compiler::EndpointCompiler;
use crate::error::{LoadError, LoadResult};
use crate::registry::EndpointRegistry;

/// Where a document comes from
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// Already-parsed structure, used as is
    Parsed(Value),
    /// A filesystem path or the raw JSON/YAML text itself
    Text(String),
}

impl From<Value> for DocumentSource {
    fn from(value: Value) -> Self {
        DocumentSource::Parsed(value)
    }
}

impl From<&str> for DocumentSource {
    fn from(text: &str) -> Self {
        DocumentSource::Text(text.to_string())
    }
}

impl From<String> for DocumentSource {
    fn from(text: String) -> Self {
        DocumentSource::Text(text)
    }
}

impl From<&Path> for DocumentSource {
    fn from(path: &Path) -> Self {
        DocumentSource::Text(path.to_string_lossy().into_owned())
    }
}

/// Loads OpenAPI 3.x and Swagger 2.0 documents
pub struct DocumentLoader;

impl DocumentLoader {
    /// Load and compile in one step
    pub fn compile(source: impl Into<DocumentSource>) -> LoadResult<EndpointRegistry> {
        let document = Self::load(source)?;
        Ok(EndpointCompiler::new(&document)?.compile())
    }

    /// Fetch, load and compile a remote document
    pub async fn compile_url(url: &str) -> LoadResult<EndpointRegistry> {
        let document = Self::load_url(url).await?;
        Ok(EndpointCompiler::new(&document)?.compile())
    }

    /// Structured input is used directly. Text naming an existing file is
    /// read and parsed by extension; any other text is parsed itself.
    pub fn load(source: impl Into<DocumentSource>) -> LoadResult<Value> {
        match source.into() {
            DocumentSource::Parsed(value) => Ok(value),
            DocumentSource::Text(text) => {
                let path = Path::new(&text);
                if path.is_file() {
                    Self::load_file(path)
                } else {
                    debug!("Source is not a file, parsing it as document text");
                    Self::parse(&text)
                }
            }
        }
    }

    /// Read a file, choosing the format from its extension
    pub fn load_file(path: &Path) -> LoadResult<Value> {
        info!("Loading OpenAPI document from: {}", path.display());
        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&content),
            Some("yaml") | Some("yml") => Self::parse_yaml(&content),
            _ => Self::parse(&content),
        }
    }

    /// Parse text as JSON, then as YAML
    pub fn parse(content: &str) -> LoadResult<Value> {
        Self::parse_json(content)
            .or_else(|_| Self::parse_yaml(content))
            .map_err(|_| LoadError::Unparsable)
    }

    pub fn parse_json(content: &str) -> LoadResult<Value> {
        let value: Value = serde_json::from_str(content)?;
        Self::require_mapping(value)
    }

    pub fn parse_yaml(content: &str) -> LoadResult<Value> {
        let content = Self::sanitize_large_numbers(content);
        let value: Value = serde_yaml::from_str(&content)?;
        Self::require_mapping(value)
    }

    /// Fetch a document over HTTP
    pub async fn load_url(url: &str) -> LoadResult<Value> {
        info!("Fetching OpenAPI document from: {}", url);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LoadError::FetchError(e.to_string()))?;

        let response = client
            .get(url)
            .header("Accept", "application/json, application/yaml, text/yaml")
            .send()
            .await
            .map_err(|e| LoadError::FetchError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LoadError::FetchError(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_default();

        let content = response
            .text()
            .await
            .map_err(|e| LoadError::FetchError(e.to_string()))?;

        if content_type.contains("yaml") || url.ends_with(".yaml") || url.ends_with(".yml") {
            Self::parse_yaml(&content)
        } else {
            Self::parse(&content)
        }
    }

    /// A document must be a mapping; YAML happily parses prose as a string
    fn require_mapping(value: Value) -> LoadResult<Value> {
        if value.is_object() {
            Ok(value)
        } else {
            Err(LoadError::InvalidFormat(
                "document root is not a mapping".to_string(),
            ))
        }
    }

    /// Clamp integer bounds too large for YAML number parsing.
    /// Some published documents use huge `minimum`/`maximum` values.
    fn sanitize_large_numbers(content: &str) -> String {
        static LARGE_BOUND: OnceLock<Option<Regex>> = OnceLock::new();
        let pattern = LARGE_BOUND.get_or_init(|| {
            Regex::new(
                r"(?m)^(\s*(?:minimum|maximum|exclusiveMinimum|exclusiveMaximum):\s*)(-?\d{16,})",
            )
            .ok()
        });

        let Some(pattern) = pattern else {
            return content.to_string();
        };

        pattern
            .replace_all(content, |caps: &regex::Captures| {
                if caps[2].starts_with('-') {
                    format!("{}-2147483648", &caps[1])
                } else {
                    format!("{}2147483647", &caps[1])
                }
            })
            .into_owned()
    }
}
