//! Type definitions shared by the compiler and the endpoint model

use indexmap::IndexMap;
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use tracing::warn;

/// HTTP methods supported by OpenAPI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Trace,
}

impl HttpMethod {
    /// All methods in the order path items are walked
    pub const ALL: [HttpMethod; 8] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
        HttpMethod::Head,
        HttpMethod::Options,
        HttpMethod::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
        }
    }

    /// Key used for this method inside a path item (`get`, `post`, ...)
    pub fn path_item_key(&self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Patch => "patch",
            HttpMethod::Delete => "delete",
            HttpMethod::Head => "head",
            HttpMethod::Options => "options",
            HttpMethod::Trace => "trace",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown HTTP method: {}", s))
    }
}

/// Location of a compiled parameter group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Form,
}

impl ParameterLocation {
    /// Map an OpenAPI `in` value to a compiled location.
    ///
    /// `body` and `cookie` have no parameter group and yield `None`.
    pub fn from_openapi(value: &str) -> Option<Self> {
        match value {
            "path" => Some(ParameterLocation::Path),
            "query" => Some(ParameterLocation::Query),
            "header" => Some(ParameterLocation::Header),
            "formData" => Some(ParameterLocation::Form),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
            ParameterLocation::Form => "form",
        }
    }
}

impl std::fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One security alternative: scheme name -> required scopes (AND)
pub type SecurityRequirement = IndexMap<String, Vec<String>>;

/// Normalized security scheme, independent of the document version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SecurityScheme {
    /// API key authentication
    ApiKey {
        name: String,
        #[serde(rename = "in")]
        location: ApiKeyLocation,
    },
    /// HTTP authentication (bearer, basic)
    Http {
        scheme: String,
        bearer_format: Option<String>,
    },
    /// OAuth2 authentication
    OAuth2 { flows: OAuth2Flows },
    /// OpenID Connect
    OpenIdConnect { openid_connect_url: String },
    /// Any scheme type this crate does not know about
    Other { scheme_type: String },
}

/// API key location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    Header,
    Query,
    Cookie,
}

/// OAuth2 flows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuth2Flows {
    pub authorization_code: Option<OAuth2Flow>,
    pub implicit: Option<OAuth2Flow>,
    pub password: Option<OAuth2Flow>,
    pub client_credentials: Option<OAuth2Flow>,
}

impl OAuth2Flows {
    /// Whether at least one flow is declared
    pub fn has_flows(&self) -> bool {
        self.authorization_code.is_some()
            || self.implicit.is_some()
            || self.password.is_some()
            || self.client_credentials.is_some()
    }

    /// The flow used for interactive authorization: authorization code first,
    /// then whichever flow carries an authorization URL.
    pub fn interactive(&self) -> Option<&OAuth2Flow> {
        self.authorization_code
            .as_ref()
            .or(self.implicit.as_ref())
            .or(self.password.as_ref())
            .or(self.client_credentials.as_ref())
    }
}

/// OAuth2 flow details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuth2Flow {
    pub authorization_url: Option<String>,
    pub token_url: Option<String>,
    pub refresh_url: Option<String>,
    pub scopes: IndexMap<String, String>,
}

/// Server information from the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server URL with variables substituted by their defaults
    pub url: String,
    /// Server description
    pub description: Option<String>,
}

// --- Raw document structures for parsing (both Swagger 2.0 and OpenAPI 3.x) ---

/// Raw document structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDocument {
    // Untyped so an unquoted YAML `swagger: 2.0` still deserializes
    pub openapi: Option<Value>,
    pub swagger: Option<Value>,
    #[serde(default, deserialize_with = "or_default")]
    pub info: Option<RawInfo>,
    #[serde(default, deserialize_with = "or_default")]
    pub servers: Vec<RawServer>,
    #[serde(default, deserialize_with = "lenient_optional_string")]
    pub host: Option<String>,
    #[serde(default, deserialize_with = "lenient_optional_string")]
    pub base_path: Option<String>,
    #[serde(default, deserialize_with = "or_default")]
    pub schemes: Vec<String>,
    #[serde(default, deserialize_with = "or_default")]
    pub consumes: Vec<String>,
    /// Path items stay untyped; each one is checked when it is compiled
    #[serde(default, deserialize_with = "or_default")]
    pub paths: IndexMap<String, Value>,
    #[serde(default, deserialize_with = "or_default")]
    pub components: Option<RawComponents>,
    #[serde(default, deserialize_with = "or_default")]
    pub security_definitions: IndexMap<String, RawSecurityScheme>,
    pub security: Option<Vec<SecurityRequirement>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawInfo {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_optional_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub version: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawServer {
    /// Empty when the entry has no usable URL
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: String,
    #[serde(default, deserialize_with = "lenient_optional_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "or_default")]
    pub variables: IndexMap<String, RawServerVariable>,
}

impl RawServer {
    /// Convert to a server with every `{variable}` replaced by its default
    pub fn to_server_info(&self) -> ServerInfo {
        let url = self
            .variables
            .iter()
            .fold(self.url.clone(), |url, (name, var)| {
                url.replace(&format!("{{{}}}", name), &var.default)
            });

        ServerInfo {
            url,
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawServerVariable {
    #[serde(default, deserialize_with = "lenient_string")]
    pub default: String,
}

/// Path item; operations stay untyped until each one is compiled
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPathItem {
    #[serde(default)]
    pub parameters: Vec<Value>,
    #[serde(default, deserialize_with = "or_default")]
    pub servers: Option<Vec<RawServer>>,
    #[serde(flatten)]
    pub entries: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOperation {
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub parameters: Vec<Value>,
    pub request_body: Option<Value>,
    #[serde(default)]
    pub responses: IndexMap<String, Value>,
    pub security: Option<Vec<SecurityRequirement>>,
    pub servers: Option<Vec<RawServer>>,
    pub consumes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawComponents {
    #[serde(default)]
    pub security_schemes: IndexMap<String, RawSecurityScheme>,
}

/// Security scheme in either document shape
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSecurityScheme {
    #[serde(rename = "type", default)]
    pub scheme_type: String,
    pub name: Option<String>,
    #[serde(rename = "in")]
    pub location: Option<String>,
    pub scheme: Option<String>,
    pub bearer_format: Option<String>,
    pub flows: Option<RawOAuth2Flows>,
    pub openid_connect_url: Option<String>,
    // Swagger 2.0 keeps the single OAuth2 flow inline
    pub flow: Option<String>,
    pub authorization_url: Option<String>,
    pub token_url: Option<String>,
    #[serde(default)]
    pub scopes: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOAuth2Flows {
    pub authorization_code: Option<RawOAuth2Flow>,
    pub access_code: Option<RawOAuth2Flow>,
    pub implicit: Option<RawOAuth2Flow>,
    pub password: Option<RawOAuth2Flow>,
    pub client_credentials: Option<RawOAuth2Flow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOAuth2Flow {
    pub authorization_url: Option<String>,
    pub token_url: Option<String>,
    pub refresh_url: Option<String>,
    #[serde(default)]
    pub scopes: IndexMap<String, String>,
}

/// Any scalar as text; `null` and structured values become empty
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(lenient_optional_string(deserializer)?.unwrap_or_default())
}

fn lenient_optional_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// A malformed section falls back to its default instead of failing the document
fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_else(|e| {
        warn!("Ignoring malformed document section: {}", e);
        T::default()
    }))
}
