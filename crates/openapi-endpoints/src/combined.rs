//! Flattened endpoint projection with one combined argument schema
//!
//! Tool-calling layers see a single object schema per operation. This module
//! unions the path, query, header, form and body properties into that schema
//! while remembering where each argument has to go.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::endpoint::{
    ArgumentLocation, Endpoint, InvocableEndpoint, RequiredParameters, WHOLE_BODY_ARGUMENT,
};
use crate::types::{HttpMethod, ParameterLocation};

/// An endpoint whose arguments arrive as one merged object
#[derive(Debug, Clone, Serialize)]
pub struct CombinedEndpoint {
    pub operation_id: String,
    pub method: HttpMethod,
    pub path: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub base_urls: Vec<String>,
    /// `{"type": "object", "properties": ..., "required": [...]}`
    pub input_schema: Value,
    pub request_content_types: Vec<String>,
    pub requires_bearer_auth: bool,
    pub requires_oauth: bool,
    pub oauth_scopes: IndexSet<String>,
    #[serde(skip)]
    locations: IndexMap<String, ArgumentLocation>,
    #[serde(skip)]
    required: RequiredParameters,
    #[serde(skip)]
    has_request_body: bool,
    #[serde(skip)]
    shadowed: Vec<(String, ArgumentLocation)>,
}

impl CombinedEndpoint {
    /// Names that must be present in a merged argument object
    pub fn required_names(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Human-readable description used by tool layers
    pub fn tool_description(&self) -> String {
        match (&self.summary, &self.description) {
            (Some(summary), Some(description)) if summary != description => {
                format!("{}\n\n{}", summary, description)
            }
            (Some(text), _) | (None, Some(text)) => text.clone(),
            (None, None) => format!("{} {}", self.method, self.path),
        }
    }

    /// Inputs left out of the merged schema because an earlier location
    /// already uses the name. They can only be sent through separated values.
    pub fn shadowed_arguments(&self) -> &[(String, ArgumentLocation)] {
        &self.shadowed
    }
}

impl Endpoint {
    /// Project into the merged-argument representation
    pub fn to_combined(&self) -> CombinedEndpoint {
        CombinedEndpoint::from(self)
    }
}

impl From<&Endpoint> for CombinedEndpoint {
    fn from(endpoint: &Endpoint) -> Self {
        let mut properties = Map::new();
        let mut required: IndexSet<String> = IndexSet::new();
        let mut locations: IndexMap<String, ArgumentLocation> = IndexMap::new();
        let mut shadowed = Vec::new();

        for location in [
            ParameterLocation::Path,
            ParameterLocation::Query,
            ParameterLocation::Header,
            ParameterLocation::Form,
        ] {
            let group = endpoint.parameters(location);
            for (name, schema) in &group.properties {
                if locations.contains_key(name) {
                    shadowed.push((name.clone(), ArgumentLocation::Parameter(location)));
                    continue;
                }
                locations.insert(name.clone(), ArgumentLocation::Parameter(location));
                properties.insert(name.clone(), schema.clone());
                if group.required.contains(name) {
                    required.insert(name.clone());
                }
            }
        }

        if let Some(body_schema) = &endpoint.request_body_schema {
            match endpoint.body_properties() {
                Some(body_props) => {
                    let body_required: Vec<&str> = body_schema
                        .get("required")
                        .and_then(Value::as_array)
                        .map(|names| names.iter().filter_map(Value::as_str).collect())
                        .unwrap_or_default();

                    for (name, schema) in body_props {
                        if locations.contains_key(name) {
                            shadowed.push((name.clone(), ArgumentLocation::BodyProperty));
                            continue;
                        }
                        locations.insert(name.clone(), ArgumentLocation::BodyProperty);
                        properties.insert(name.clone(), schema.clone());
                        if endpoint.request_body_required && body_required.contains(&name.as_str())
                        {
                            required.insert(name.clone());
                        }
                    }
                }
                None => {
                    locations.insert(WHOLE_BODY_ARGUMENT.to_string(), ArgumentLocation::WholeBody);
                    properties.insert(WHOLE_BODY_ARGUMENT.to_string(), body_schema.clone());
                    if endpoint.request_body_required {
                        required.insert(WHOLE_BODY_ARGUMENT.to_string());
                    }
                }
            }
        }

        for (name, location) in &shadowed {
            warn!(
                "{}: {:?} input '{}' is hidden by an earlier input of the same name",
                endpoint.operation_id, location, name
            );
        }

        let mut input_schema = Map::new();
        input_schema.insert("type".to_string(), Value::from("object"));
        input_schema.insert("properties".to_string(), Value::Object(properties));
        if !required.is_empty() {
            input_schema.insert(
                "required".to_string(),
                required.into_iter().map(Value::from).collect(),
            );
        }

        Self {
            operation_id: endpoint.operation_id.clone(),
            method: endpoint.method,
            path: endpoint.path.clone(),
            summary: endpoint.summary.clone(),
            description: endpoint.description.clone(),
            base_urls: endpoint.base_urls().into_iter().map(str::to_string).collect(),
            input_schema: Value::Object(input_schema),
            request_content_types: endpoint.request_content_types.clone(),
            requires_bearer_auth: endpoint.requires_bearer_auth,
            requires_oauth: endpoint.requires_oauth,
            oauth_scopes: endpoint.oauth_scopes.clone(),
            locations,
            required: endpoint.required_parameters(),
            has_request_body: endpoint.request_body_schema.is_some(),
            shadowed,
        }
    }
}

impl InvocableEndpoint for CombinedEndpoint {
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
        self.base_urls.iter().map(String::as_str).collect()
    }

    fn required_parameters(&self) -> RequiredParameters {
        self.required.clone()
    }

    fn locate_argument(&self, name: &str) -> Option<ArgumentLocation> {
        self.locations.get(name).copied()
    }

    fn has_request_body(&self) -> bool {
        self.has_request_body
    }

    fn has_form_parameters(&self) -> bool {
        self.locations
            .values()
            .any(|loc| *loc == ArgumentLocation::Parameter(ParameterLocation::Form))
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
