//! Compilation of a parsed document into an endpoint registry

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::endpoint::{path_tokens, scalar_to_string, Endpoint};
use crate::error::{CompileError, LoadError, LoadResult, ResolveResult};
use crate::registry::EndpointRegistry;
use crate::resolver::SchemaResolver;
use crate::security::SecurityClassifier;
use crate::types::*;

/// Schema keywords a Swagger 2.0 parameter carries inline
const INLINE_SCHEMA_FIELDS: [&str; 11] = [
    "type",
    "format",
    "enum",
    "default",
    "minimum",
    "maximum",
    "pattern",
    "items",
    "minLength",
    "maxLength",
    "collectionFormat",
];

const JSON_CONTENT_TYPE: &str = "application/json";
const MULTIPART_CONTENT_TYPE: &str = "multipart/form-data";
const URLENCODED_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Document dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DocumentVersion {
    Swagger2,
    OpenApi3,
}

impl DocumentVersion {
    /// Accepts `openapi: 3.x` or `swagger: 2.0`
    pub fn detect(raw: &RawDocument) -> LoadResult<Self> {
        let openapi = raw.openapi.as_ref().map(scalar_to_string);
        let swagger = raw.swagger.as_ref().map(scalar_to_string);

        match (openapi, swagger) {
            (Some(v), _) if v.starts_with("3.") => Ok(DocumentVersion::OpenApi3),
            (_, Some(v)) if v == "2.0" || v == "2" => Ok(DocumentVersion::Swagger2),
            (Some(v), _) | (None, Some(v)) => Err(LoadError::UnsupportedVersion(v)),
            (None, None) => Err(LoadError::UnsupportedVersion(
                "document declares neither `openapi` nor `swagger`".to_string(),
            )),
        }
    }
}

/// Compiles every operation of one document into [`Endpoint`]s
pub struct EndpointCompiler<'a> {
    document: &'a Value,
    raw: RawDocument,
    version: DocumentVersion,
    classifier: SecurityClassifier,
    default_server_url: Option<String>,
}

impl<'a> EndpointCompiler<'a> {
    /// Prepare a compiler; fails if the document version is unsupported
    pub fn new(document: &'a Value) -> LoadResult<Self> {
        let raw: RawDocument = serde_json::from_value(document.clone())
            .map_err(|e| LoadError::InvalidFormat(e.to_string()))?;
        let version = DocumentVersion::detect(&raw)?;
        let classifier = SecurityClassifier::from_document(&raw);
        let default_server_url = match version {
            DocumentVersion::Swagger2 => swagger2_base_url(&raw),
            DocumentVersion::OpenApi3 => None,
        };

        Ok(Self {
            document,
            raw,
            version,
            classifier,
            default_server_url,
        })
    }

    pub fn version(&self) -> DocumentVersion {
        self.version
    }

    pub fn classifier(&self) -> &SecurityClassifier {
        &self.classifier
    }

    /// Compile every operation. Operations that fail to resolve are logged
    /// and skipped, as are operations no alternative of which can be driven.
    pub fn compile(&self) -> EndpointRegistry {
        let info = self.raw.info.clone().unwrap_or_default();
        debug!(
            "Compiling {:?} document: {} {}",
            self.version, info.title, info.version
        );

        let mut endpoints = IndexMap::new();
        for (path, item) in &self.raw.paths {
            let item: RawPathItem = match serde_json::from_value(item.clone()) {
                Ok(item) => item,
                Err(e) => {
                    warn!("Skipping malformed path item {}: {}", path, e);
                    continue;
                }
            };

            for method in HttpMethod::ALL {
                let Some(operation) = item.entries.get(method.path_item_key()) else {
                    continue;
                };

                match self.compile_operation(path, method, &item, operation) {
                    Ok(Some(endpoint)) => {
                        debug!("Compiled endpoint: {} {}", method, path);
                        endpoints.insert((method, path.clone()), endpoint);
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Skipping operation {}", e),
                }
            }
        }

        info!("Compiled {} endpoints from '{}'", endpoints.len(), info.title);

        EndpointRegistry::new(info, self.version, endpoints, self.classifier.clone())
    }

    /// Compile one operation; `Ok(None)` means it was excluded
    pub fn compile_operation(
        &self,
        path: &str,
        method: HttpMethod,
        item: &RawPathItem,
        operation: &Value,
    ) -> Result<Option<Endpoint>, CompileError> {
        let raw: RawOperation =
            serde_json::from_value(operation.clone()).map_err(|e| CompileError::Malformed {
                method: method.to_string(),
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        // Operation-level security replaces the global list, even when empty
        let requirements = raw
            .security
            .clone()
            .or_else(|| self.raw.security.clone())
            .unwrap_or_default();
        let profile = self.classifier.classify(&requirements);
        if !profile.reachable {
            info!(
                "Excluding {} {}: every security alternative needs an unsupported scheme",
                method, path
            );
            return Ok(None);
        }

        let operation_id = raw
            .operation_id
            .clone()
            .unwrap_or_else(|| generate_operation_id(path, method));

        let mut endpoint = Endpoint::new(method, path, operation_id);
        endpoint.summary = raw.summary.clone();
        endpoint.description = raw.description.clone();
        endpoint.deprecated = raw.deprecated;
        endpoint.tags = raw.tags.clone();
        endpoint.servers = self.servers_for(&raw, item);
        endpoint.default_server_url = self.default_server_url.clone();
        endpoint.security_requirements = requirements;
        endpoint.requires_bearer_auth = profile.requires_bearer_auth;
        endpoint.requires_oauth = profile.requires_oauth;
        endpoint.oauth_scopes = profile.oauth_scopes;

        self.compile_inputs(&mut endpoint, item, &raw)
            .map_err(|source| CompileError::Reference {
                method: method.to_string(),
                path: path.to_string(),
                source,
            })?;
        self.compile_responses(&mut endpoint, &raw);

        Ok(Some(endpoint))
    }

    /// Operation servers, else path-item servers, else document servers.
    /// Entries without a URL do not count as declared.
    fn servers_for(&self, raw: &RawOperation, item: &RawPathItem) -> Vec<ServerInfo> {
        let usable = |servers: &[RawServer]| -> Vec<ServerInfo> {
            servers
                .iter()
                .filter(|server| !server.url.is_empty())
                .map(RawServer::to_server_info)
                .collect()
        };

        [
            raw.servers.as_deref(),
            item.servers.as_deref(),
            Some(self.raw.servers.as_slice()),
        ]
        .into_iter()
        .flatten()
        .map(usable)
        .find(|servers| !servers.is_empty())
        .unwrap_or_default()
    }

    /// Parameters and request body
    fn compile_inputs(
        &self,
        endpoint: &mut Endpoint,
        item: &RawPathItem,
        raw: &RawOperation,
    ) -> ResolveResult<()> {
        let resolver = SchemaResolver::new(self.document);

        // Keyed by (name, in); operation parameters replace path-level ones
        let mut merged: IndexMap<(String, String), Value> = IndexMap::new();
        for param in item.parameters.iter().chain(&raw.parameters) {
            let param = resolver.resolve(param)?;
            let name = param.get("name").and_then(Value::as_str).unwrap_or_default();
            let location = param.get("in").and_then(Value::as_str).unwrap_or_default();
            if name.is_empty() && location != "body" {
                debug!("Ignoring unnamed parameter on {} {}", endpoint.method, endpoint.path);
                continue;
            }
            merged.insert((name.to_string(), location.to_string()), param);
        }

        let mut has_file_parameter = false;
        for ((name, location), param) in &merged {
            if location == "body" {
                endpoint.request_body_schema =
                    Some(param.get("schema").cloned().unwrap_or_else(|| json!({})));
                endpoint.request_body_required = is_required(param, false);
                continue;
            }

            let Some(group) = ParameterLocation::from_openapi(location) else {
                debug!(
                    "Ignoring {} parameter '{}' on {} {}",
                    location, name, endpoint.method, endpoint.path
                );
                continue;
            };

            let schema = parameter_schema(param);
            has_file_parameter |= schema.get("type").and_then(Value::as_str) == Some("file");

            let required = is_required(param, group == ParameterLocation::Path);
            let target = endpoint.parameters_mut(group);
            target.properties.insert(name.clone(), schema);
            if required {
                target.required.insert(name.clone());
            }
        }

        // Every template token needs a path parameter
        let path = endpoint.path.clone();
        for token in path_tokens(&path) {
            if !endpoint.path_parameters.contains(token) {
                debug!("Synthesizing path parameter '{}' for {}", token, endpoint.path);
                endpoint
                    .path_parameters
                    .properties
                    .insert(token.to_string(), json!({"type": "string"}));
                endpoint.path_parameters.required.insert(token.to_string());
            }
        }

        let consumes = raw
            .consumes
            .clone()
            .filter(|types| !types.is_empty())
            .or_else(|| Some(self.raw.consumes.clone()).filter(|types| !types.is_empty()));

        if endpoint.request_body_schema.is_some() {
            endpoint.request_content_types =
                consumes.unwrap_or_else(|| vec![JSON_CONTENT_TYPE.to_string()]);
        } else if !endpoint.form_parameters.is_empty() {
            endpoint.request_content_types = consumes.unwrap_or_else(|| {
                let default = if has_file_parameter {
                    MULTIPART_CONTENT_TYPE
                } else {
                    URLENCODED_CONTENT_TYPE
                };
                vec![default.to_string()]
            });
        }

        if let Some(body) = &raw.request_body {
            let body = resolver.resolve(body)?;
            self.compile_request_body(endpoint, &body);
        }

        Ok(())
    }

    /// OpenAPI 3 `requestBody`, preferring JSON content
    fn compile_request_body(&self, endpoint: &mut Endpoint, body: &Value) {
        let Some(content) = body.get("content").and_then(Value::as_object) else {
            return;
        };

        let chosen = match content.get(JSON_CONTENT_TYPE) {
            Some(media) if media.get("schema").is_some() => {
                Some((JSON_CONTENT_TYPE.to_string(), media))
            }
            _ => content
                .iter()
                .find(|(_, media)| media.get("schema").is_some())
                .map(|(content_type, media)| (content_type.clone(), media)),
        };

        let Some((content_type, media)) = chosen else {
            debug!("Request body of {} {} has no schema", endpoint.method, endpoint.path);
            return;
        };

        endpoint.request_body_schema = media.get("schema").cloned();
        endpoint.request_body_required = is_required(body, false);
        endpoint.request_content_types = content
            .keys()
            .filter(|ct| **ct != content_type)
            .cloned()
            .fold(vec![content_type.clone()], |mut types, ct| {
                types.push(ct);
                types
            });
    }

    fn compile_responses(&self, endpoint: &mut Endpoint, raw: &RawOperation) {
        let resolver = SchemaResolver::new(self.document);

        for (status, response) in &raw.responses {
            let response = match resolver.resolve(response) {
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!(
                        "Keeping unresolved response {} of {} {}: {}",
                        status, endpoint.method, endpoint.path, e
                    );
                    response.clone()
                }
            };

            if let Some(content) = response.get("content").and_then(Value::as_object) {
                for content_type in content.keys() {
                    if !endpoint.response_content_types.contains(content_type) {
                        endpoint.response_content_types.push(content_type.clone());
                    }
                }
            }
            endpoint.responses.insert(status.clone(), response);
        }
    }
}

/// `{scheme}://{host}{basePath}` for Swagger 2.0
fn swagger2_base_url(raw: &RawDocument) -> Option<String> {
    let host = raw.host.as_deref().filter(|host| !host.is_empty())?;
    let scheme = raw.schemes.first().map(String::as_str).unwrap_or("http");
    let base_path = raw
        .base_path
        .as_deref()
        .map(|path| path.trim_end_matches('/'))
        .unwrap_or_default();

    Some(format!("{}://{}{}", scheme, host, base_path))
}

/// Generate an operation ID from path and method
fn generate_operation_id(path: &str, method: HttpMethod) -> String {
    // /users/{id}/posts -> get_users_id_posts
    let path_part = path
        .trim_start_matches('/')
        .replace('/', "_")
        .replace(['{', '}'], "");

    format!("{}_{}", method.path_item_key(), path_part)
}

fn is_required(param: &Value, default: bool) -> bool {
    param
        .get("required")
        .and_then(Value::as_bool)
        .unwrap_or(default)
}

/// Property schema of a parameter, lifting Swagger 2.0 inline keywords
fn parameter_schema(param: &Value) -> Value {
    let mut schema: Map<String, Value> = match param.get("schema") {
        Some(Value::Object(schema)) => schema.clone(),
        _ => INLINE_SCHEMA_FIELDS
            .iter()
            .filter_map(|field| param.get(*field).map(|v| (field.to_string(), v.clone())))
            .collect(),
    };

    if let Some(description) = param.get("description") {
        schema.insert("description".to_string(), description.clone());
    }
    Value::Object(schema)
}
