//! Queryable collection of compiled endpoints

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};

use crate::combined::CombinedEndpoint;
use crate::compiler::DocumentVersion;
use crate::endpoint::Endpoint;
use crate::security::SecurityClassifier;
use crate::types::{HttpMethod, RawInfo, SecurityScheme};

/// Title and version of the compiled document
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentInfo {
    pub title: String,
    pub description: Option<String>,
    pub version: String,
}

impl From<RawInfo> for DocumentInfo {
    fn from(raw: RawInfo) -> Self {
        Self {
            title: raw.title,
            description: raw.description,
            version: raw.version,
        }
    }
}

/// Endpoints keyed uniquely by (method, path)
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    info: DocumentInfo,
    document_version: DocumentVersion,
    endpoints: IndexMap<(HttpMethod, String), Endpoint>,
    classifier: SecurityClassifier,
}

impl EndpointRegistry {
    pub fn new(
        info: impl Into<DocumentInfo>,
        document_version: DocumentVersion,
        endpoints: IndexMap<(HttpMethod, String), Endpoint>,
        classifier: SecurityClassifier,
    ) -> Self {
        Self {
            info: info.into(),
            document_version,
            endpoints,
            classifier,
        }
    }

    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }

    pub fn document_version(&self) -> DocumentVersion {
        self.document_version
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Endpoints in document order
    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values()
    }

    pub fn get(&self, method: HttpMethod, path: &str) -> Option<&Endpoint> {
        self.endpoints.get(&(method, path.to_string()))
    }

    pub fn by_operation_id(&self, operation_id: &str) -> Option<&Endpoint> {
        self.iter().find(|e| e.operation_id == operation_id)
    }

    pub fn with_request_body(&self) -> Vec<&Endpoint> {
        self.filter(|e| e.request_body_schema.is_some())
    }

    pub fn with_query_parameters(&self) -> Vec<&Endpoint> {
        self.filter(|e| !e.query_parameters.is_empty())
    }

    pub fn with_path_parameters(&self) -> Vec<&Endpoint> {
        self.filter(|e| !e.path_parameters.is_empty())
    }

    pub fn with_form_parameters(&self) -> Vec<&Endpoint> {
        self.filter(|e| !e.form_parameters.is_empty())
    }

    pub fn requiring_bearer_auth(&self) -> Vec<&Endpoint> {
        self.filter(|e| e.requires_bearer_auth)
    }

    pub fn requiring_oauth(&self) -> Vec<&Endpoint> {
        self.filter(|e| e.requires_oauth)
    }

    /// Keep only endpoints matching `predicate`
    pub fn retain(&mut self, mut predicate: impl FnMut(&Endpoint) -> bool) {
        self.endpoints.retain(|_, endpoint| predicate(endpoint));
    }

    /// Every endpoint projected into its merged-argument form
    pub fn combined(&self) -> Vec<CombinedEndpoint> {
        self.iter().map(CombinedEndpoint::from).collect()
    }

    pub fn security_classifier(&self) -> &SecurityClassifier {
        &self.classifier
    }

    pub fn security_scheme(&self, name: &str) -> Option<&SecurityScheme> {
        self.classifier.scheme(name)
    }

    /// First declared OAuth2 scheme, used to derive client settings
    pub fn oauth_scheme(&self) -> Option<(&str, &SecurityScheme)> {
        self.classifier
            .schemes()
            .iter()
            .find(|(_, scheme)| scheme.is_oauth())
            .map(|(name, scheme)| (name.as_str(), scheme))
    }

    /// JSON summary of the document and every endpoint
    pub fn to_json(&self) -> Value {
        json!({
            "info": self.info,
            "documentVersion": self.document_version,
            "endpointCount": self.endpoints.len(),
            "endpoints": self.iter().collect::<Vec<_>>(),
        })
    }

    fn filter(&self, predicate: impl Fn(&Endpoint) -> bool) -> Vec<&Endpoint> {
        self.iter().filter(|e| predicate(e)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::EndpointCompiler;

    fn registry() -> EndpointRegistry {
        let document = json!({
            "openapi": "3.0.0",
            "info": {"title": "Shop", "version": "2.1.0"},
            "servers": [{"url": "https://shop.example.com"}],
            "components": {
                "securitySchemes": {
                    "oauth": {
                        "type": "oauth2",
                        "flows": {
                            "authorizationCode": {
                                "authorizationUrl": "https://auth.example.com/authorize",
                                "tokenUrl": "https://auth.example.com/token",
                                "scopes": {"orders:read": "Read orders"}
                            }
                        }
                    }
                }
            },
            "paths": {
                "/orders": {
                    "get": {
                        "operationId": "listOrders",
                        "security": [{"oauth": ["orders:read"]}],
                        "parameters": [{"name": "page", "in": "query", "schema": {"type": "integer"}}]
                    },
                    "post": {
                        "operationId": "createOrder",
                        "requestBody": {
                            "content": {"application/json": {"schema": {"type": "object"}}}
                        }
                    }
                },
                "/orders/{id}": {
                    "get": {"operationId": "getOrder"}
                }
            }
        });
        EndpointCompiler::new(&document).unwrap().compile()
    }

    #[test]
    fn test_lookup_by_method_path_and_operation_id() {
        let registry = registry();

        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.get(HttpMethod::Get, "/orders").unwrap().operation_id,
            "listOrders"
        );
        assert!(registry.get(HttpMethod::Delete, "/orders").is_none());
        assert_eq!(registry.by_operation_id("getOrder").unwrap().path, "/orders/{id}");
    }

    #[test]
    fn test_filtered_queries() {
        let registry = registry();

        let ids = |endpoints: Vec<&Endpoint>| {
            endpoints
                .into_iter()
                .map(|e| e.operation_id.clone())
                .collect::<Vec<_>>()
        };

        assert_eq!(ids(registry.with_request_body()), vec!["createOrder"]);
        assert_eq!(ids(registry.with_query_parameters()), vec!["listOrders"]);
        assert_eq!(ids(registry.with_path_parameters()), vec!["getOrder"]);
        assert!(registry.with_form_parameters().is_empty());
        assert_eq!(ids(registry.requiring_oauth()), vec!["listOrders"]);
        assert_eq!(ids(registry.requiring_bearer_auth()), vec!["listOrders"]);
    }

    #[test]
    fn test_oauth_scheme_lookup() {
        let registry = registry();
        let (name, scheme) = registry.oauth_scheme().unwrap();

        assert_eq!(name, "oauth");
        assert_eq!(
            scheme.oauth_endpoints().unwrap().token_url.as_deref(),
            Some("https://auth.example.com/token")
        );
    }

    #[test]
    fn test_retain_and_json_export() {
        let mut registry = registry();
        registry.retain(|e| e.method == HttpMethod::Get);

        let summary = registry.to_json();
        assert_eq!(summary["info"]["title"], "Shop");
        assert_eq!(summary["documentVersion"], "OpenApi3");
        assert_eq!(summary["endpointCount"], 2);
        assert_eq!(summary["endpoints"][0]["operation_id"], "listOrders");
        assert_eq!(summary["endpoints"][0]["method"], "GET");
        assert_eq!(
            summary["endpoints"][0]["query_parameters"]["properties"]["page"]["type"],
            "integer"
        );
    }
}
