//! Compiled endpoint model and the invocation-facing trait

use indexmap::{IndexMap, IndexSet};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use url::Url;

use crate::error::UrlError;
use crate::types::{HttpMethod, ParameterLocation, SecurityRequirement, ServerInfo};

/// Characters left untouched when substituting a path value (RFC 3986 unreserved)
const PATH_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Object schema for one parameter location
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSchema {
    /// Property name -> JSON schema
    pub properties: IndexMap<String, Value>,
    /// Names that must be supplied
    pub required: IndexSet<String>,
}

impl ParameterSchema {
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Render as a JSON schema object; `required` is omitted when empty
    pub fn to_json_schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".to_string(), Value::from("object"));
        schema.insert(
            "properties".to_string(),
            Value::Object(self.properties.clone().into_iter().collect()),
        );
        if !self.required.is_empty() {
            schema.insert(
                "required".to_string(),
                self.required.iter().cloned().map(Value::from).collect(),
            );
        }
        Value::Object(schema)
    }
}

impl Serialize for ParameterSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let schema = self.to_json_schema();
        let mut map = serializer.serialize_map(None)?;
        if let Value::Object(obj) = &schema {
            for (key, value) in obj {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

/// Required names per location plus the required-body flag
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredParameters {
    pub path: Vec<String>,
    pub query: Vec<String>,
    pub header: Vec<String>,
    pub form: Vec<String>,
    pub body: bool,
}

impl RequiredParameters {
    pub fn for_location(&self, location: ParameterLocation) -> &[String] {
        match location {
            ParameterLocation::Path => &self.path,
            ParameterLocation::Query => &self.query,
            ParameterLocation::Header => &self.header,
            ParameterLocation::Form => &self.form,
        }
    }
}

/// Where a merged argument belongs when a call is split apart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentLocation {
    Parameter(ParameterLocation),
    /// A property of an object request body
    BodyProperty,
    /// The complete request body (non-object bodies are passed as `body`)
    WholeBody,
}

/// Name under which a non-object request body is exposed
pub const WHOLE_BODY_ARGUMENT: &str = "body";

/// Operations the request builder needs from an endpoint representation
pub trait InvocableEndpoint {
    fn method(&self) -> HttpMethod;

    /// Path template with `{name}` placeholders
    fn path(&self) -> &str;

    fn operation_id(&self) -> &str;

    /// Candidate base URLs in preference order
    fn base_urls(&self) -> Vec<&str>;

    fn required_parameters(&self) -> RequiredParameters;

    /// Classify a merged argument name
    fn locate_argument(&self, name: &str) -> Option<ArgumentLocation>;

    /// Whether a request body schema is declared
    fn has_request_body(&self) -> bool;

    fn has_form_parameters(&self) -> bool;

    fn request_content_types(&self) -> &[String];

    fn requires_bearer_auth(&self) -> bool;

    fn requires_oauth(&self) -> bool;

    fn oauth_scopes(&self) -> &IndexSet<String>;

    /// Resolve the request URL. An explicit `server_url` beats the recorded
    /// servers; every `{name}` token must be present in `path_values`.
    fn full_url(
        &self,
        server_url: Option<&str>,
        path_values: &Map<String, Value>,
    ) -> Result<String, UrlError> {
        let path = substitute_path(self.path(), path_values)?;
        let base = server_url
            .or_else(|| self.base_urls().first().copied())
            .unwrap_or_default();

        let url = format!("{}{}", base.trim_end_matches('/'), path);
        match Url::parse(&url) {
            Ok(parsed) if parsed.has_host() => Ok(url),
            _ => Err(UrlError::MissingServerUrl),
        }
    }
}

/// Render a JSON scalar the way it appears in a URL or form field
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Names of the `{name}` tokens of a path template, in order
pub fn path_tokens(template: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        tokens.push(&rest[start + 1..start + len]);
        rest = &rest[start + len + 1..];
    }
    tokens
}

/// Replace every `{name}` token with the percent-encoded value
pub fn substitute_path(
    template: &str,
    path_values: &Map<String, Value>,
) -> Result<String, UrlError> {
    let mut path = template.to_string();
    for token in path_tokens(template) {
        let value = path_values
            .get(token)
            .filter(|v| !v.is_null())
            .ok_or_else(|| UrlError::MissingPathParameter(token.to_string()))?;
        let encoded = utf8_percent_encode(&scalar_to_string(value), PATH_VALUE).to_string();
        path = path.replace(&format!("{{{}}}", token), &encoded);
    }
    Ok(path)
}

/// The compiled, queryable description of one operation
#[derive(Debug, Clone, Serialize)]
pub struct Endpoint {
    pub path: String,
    pub method: HttpMethod,
    pub operation_id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub deprecated: bool,
    pub tags: Vec<String>,
    /// Operation, path-item or document servers, whichever is declared first
    pub servers: Vec<ServerInfo>,
    /// `{scheme}://{host}{basePath}` for Swagger 2.0 documents
    pub default_server_url: Option<String>,
    /// Effective requirement list (alternatives)
    pub security_requirements: Vec<SecurityRequirement>,
    pub requires_bearer_auth: bool,
    pub requires_oauth: bool,
    pub oauth_scopes: IndexSet<String>,
    pub request_body_schema: Option<Value>,
    pub request_body_required: bool,
    pub request_content_types: Vec<String>,
    pub path_parameters: ParameterSchema,
    pub query_parameters: ParameterSchema,
    pub header_parameters: ParameterSchema,
    pub form_parameters: ParameterSchema,
    /// Status code -> resolved response object
    pub responses: IndexMap<String, Value>,
    pub response_content_types: Vec<String>,
}

impl Endpoint {
    /// Create an endpoint with no parameters, body or security
    pub fn new(method: HttpMethod, path: impl Into<String>, operation_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            operation_id: operation_id.into(),
            summary: None,
            description: None,
            deprecated: false,
            tags: Vec::new(),
            servers: Vec::new(),
            default_server_url: None,
            security_requirements: Vec::new(),
            requires_bearer_auth: false,
            requires_oauth: false,
            oauth_scopes: IndexSet::new(),
            request_body_schema: None,
            request_body_required: false,
            request_content_types: Vec::new(),
            path_parameters: ParameterSchema::default(),
            query_parameters: ParameterSchema::default(),
            header_parameters: ParameterSchema::default(),
            form_parameters: ParameterSchema::default(),
            responses: IndexMap::new(),
            response_content_types: Vec::new(),
        }
    }

    pub fn parameters(&self, location: ParameterLocation) -> &ParameterSchema {
        match location {
            ParameterLocation::Path => &self.path_parameters,
            ParameterLocation::Query => &self.query_parameters,
            ParameterLocation::Header => &self.header_parameters,
            ParameterLocation::Form => &self.form_parameters,
        }
    }

    pub fn parameters_mut(&mut self, location: ParameterLocation) -> &mut ParameterSchema {
        match location {
            ParameterLocation::Path => &mut self.path_parameters,
            ParameterLocation::Query => &mut self.query_parameters,
            ParameterLocation::Header => &mut self.header_parameters,
            ParameterLocation::Form => &mut self.form_parameters,
        }
    }

    /// First candidate base URL, if any
    pub fn server_url(&self) -> Option<&str> {
        self.base_urls().first().copied()
    }

    pub fn requires_request_body(&self) -> bool {
        self.request_body_required
    }

    /// Property names of an object request body
    pub fn body_properties(&self) -> Option<&Map<String, Value>> {
        self.request_body_schema
            .as_ref()
            .and_then(|schema| schema.get("properties"))
            .and_then(Value::as_object)
    }
}

const LOCATIONS: [ParameterLocation; 4] = [
    ParameterLocation::Path,
    ParameterLocation::Query,
    ParameterLocation::Header,
    ParameterLocation::Form,
];

impl InvocableEndpoint for Endpoint {
    fn method(&self) -> HttpMethod {
        self.method
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn operation_id(&self) -> &str {
        &self.operation_id
    }

    fn base_urls(&self) -> Vec<&str> {
        self.servers
            .iter()
            .map(|s| s.url.as_str())
            .chain(self.default_server_url.as_deref())
            .collect()
    }

    fn required_parameters(&self) -> RequiredParameters {
        let names = |location: ParameterLocation| -> Vec<String> {
            self.parameters(location)
                .required
                .iter()
                .cloned()
                .collect()
        };

        RequiredParameters {
            path: names(ParameterLocation::Path),
            query: names(ParameterLocation::Query),
            header: names(ParameterLocation::Header),
            form: names(ParameterLocation::Form),
            body: self.request_body_required,
        }
    }

    fn locate_argument(&self, name: &str) -> Option<ArgumentLocation> {
        if let Some(location) = LOCATIONS
            .into_iter()
            .find(|location| self.parameters(*location).contains(name))
        {
            return Some(ArgumentLocation::Parameter(location));
        }

        match self.body_properties() {
            Some(props) if props.contains_key(name) => Some(ArgumentLocation::BodyProperty),
            None if self.request_body_schema.is_some() && name == WHOLE_BODY_ARGUMENT => {
                Some(ArgumentLocation::WholeBody)
            }
            _ => None,
        }
    }

    fn has_request_body(&self) -> bool {
        self.request_body_schema.is_some()
    }

    fn has_form_parameters(&self) -> bool {
        !self.form_parameters.is_empty()
    }

    fn request_content_types(&self) -> &[String] {
        &self.request_content_types
    }

    fn requires_bearer_auth(&self) -> bool {
        self.requires_bearer_auth
    }

    fn requires_oauth(&self) -> bool {
        self.requires_oauth
    }

    fn oauth_scopes(&self) -> &IndexSet<String> {
        &self.oauth_scopes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn toys_endpoint() -> Endpoint {
        let mut endpoint = Endpoint::new(HttpMethod::Get, "/pets/{petId}/toys/{toyId}", "getToy");
        endpoint.servers.push(ServerInfo {
            url: "https://api.example.com/v1/".to_string(),
            description: None,
        });
        for name in ["petId", "toyId"] {
            endpoint
                .path_parameters
                .properties
                .insert(name.to_string(), json!({"type": "string"}));
            endpoint.path_parameters.required.insert(name.to_string());
        }
        endpoint
    }

    fn values(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_full_url_substitutes_path_values() {
        let endpoint = toys_endpoint();
        let url = endpoint
            .full_url(None, &values(json!({"petId": 123, "toyId": "ball"})))
            .unwrap();

        assert_eq!(url, "https://api.example.com/v1/pets/123/toys/ball");
    }

    #[test]
    fn test_full_url_reports_missing_token() {
        let endpoint = toys_endpoint();
        let err = endpoint
            .full_url(None, &values(json!({"petId": 123})))
            .unwrap_err();

        assert_eq!(err, UrlError::MissingPathParameter("toyId".to_string()));
    }

    #[test]
    fn test_full_url_encodes_values() {
        let endpoint = toys_endpoint();
        let url = endpoint
            .full_url(None, &values(json!({"petId": "a b/c", "toyId": "x~y"})))
            .unwrap();

        assert!(url.ends_with("/pets/a%20b%2Fc/toys/x~y"));
    }

    #[test]
    fn test_explicit_server_url_wins() {
        let endpoint = toys_endpoint();
        let url = endpoint
            .full_url(
                Some("http://localhost:8080"),
                &values(json!({"petId": 1, "toyId": 2})),
            )
            .unwrap();

        assert_eq!(url, "http://localhost:8080/pets/1/toys/2");
    }

    #[test]
    fn test_relative_server_is_missing_server_url() {
        let mut endpoint = Endpoint::new(HttpMethod::Get, "/pets", "listPets");
        assert_eq!(
            endpoint.full_url(None, &Map::new()).unwrap_err(),
            UrlError::MissingServerUrl
        );

        endpoint.servers.push(ServerInfo {
            url: "/v1".to_string(),
            description: None,
        });
        assert_eq!(
            endpoint.full_url(None, &Map::new()).unwrap_err(),
            UrlError::MissingServerUrl
        );
    }

    #[test]
    fn test_default_server_url_is_last_candidate() {
        let mut endpoint = Endpoint::new(HttpMethod::Get, "/pets", "listPets");
        endpoint.default_server_url = Some("http://api.example.com".to_string());

        assert_eq!(endpoint.server_url(), Some("http://api.example.com"));
        assert_eq!(
            endpoint.full_url(None, &Map::new()).unwrap(),
            "http://api.example.com/pets"
        );
    }

    #[test]
    fn test_locate_argument() {
        let mut endpoint = toys_endpoint();
        endpoint
            .query_parameters
            .properties
            .insert("limit".to_string(), json!({"type": "integer"}));
        endpoint.request_body_schema = Some(json!({
            "type": "object",
            "properties": {"name": {"type": "string"}}
        }));

        assert_eq!(
            endpoint.locate_argument("petId"),
            Some(ArgumentLocation::Parameter(ParameterLocation::Path))
        );
        assert_eq!(
            endpoint.locate_argument("limit"),
            Some(ArgumentLocation::Parameter(ParameterLocation::Query))
        );
        assert_eq!(
            endpoint.locate_argument("name"),
            Some(ArgumentLocation::BodyProperty)
        );
        assert_eq!(endpoint.locate_argument("body"), None);

        endpoint.request_body_schema = Some(json!({"type": "array"}));
        assert_eq!(
            endpoint.locate_argument("body"),
            Some(ArgumentLocation::WholeBody)
        );
    }

    #[test]
    fn test_parameter_schema_json_omits_empty_required() {
        let mut schema = ParameterSchema::default();
        schema
            .properties
            .insert("q".to_string(), json!({"type": "string"}));

        assert_eq!(
            schema.to_json_schema(),
            json!({"type": "object", "properties": {"q": {"type": "string"}}})
        );

        schema.required.insert("q".to_string());
        assert_eq!(serde_json::to_value(&schema).unwrap()["required"], json!(["q"]));
    }

    #[test]
    fn test_path_tokens() {
        assert_eq!(path_tokens("/a/{x}/b/{y}"), vec!["x", "y"]);
        assert!(path_tokens("/plain").is_empty());
    }
}
