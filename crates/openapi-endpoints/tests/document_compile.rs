use openapi_endpoints::{
    DocumentLoader, DocumentVersion, HttpMethod, InvocableEndpoint, LoadError, SecurityScheme,
};
use serde_json::{json, Map, Value};

const SWAGGER2_YAML: &str = r#"
swagger: "2.0"
info:
  title: Chat API
  version: "1.0"
host: chat.example.com
basePath: /api
schemes:
  - https
securityDefinitions:
  slackAuth:
    type: oauth2
    flow: accessCode
    authorizationUrl: https://chat.example.com/oauth/authorize
    tokenUrl: https://chat.example.com/api/oauth.access
    scopes:
      chat:write: Post messages
      channels:read: List channels
  session:
    type: apiKey
    in: header
    name: X-Session
security:
  - slackAuth:
      - channels:read
paths:
  /chat.postMessage:
    post:
      operationId: chat_postMessage
      consumes:
        - application/x-www-form-urlencoded
      security:
        - slackAuth:
            - chat:write
      parameters:
        - name: channel
          in: formData
          type: string
          required: true
        - name: text
          in: formData
          type: string
  /conversations.list:
    get:
      operationId: conversations_list
      parameters:
        - name: limit
          in: query
          type: integer
          default: 100
  /admin.sessions:
    get:
      operationId: admin_sessions
      security:
        - session: []
"#;

fn v3_document(extra_alternative: Option<Value>) -> Value {
    let mut security = vec![json!({"cookieAuth": []})];
    security.extend(extra_alternative);

    json!({
        "openapi": "3.0.3",
        "info": {"title": "Accounts", "version": "3.2.1"},
        "servers": [{
            "url": "https://{tenant}.accounts.example.com/v1",
            "variables": {"tenant": {"default": "demo"}}
        }],
        "components": {
            "securitySchemes": {
                "cookieAuth": {"type": "apiKey", "in": "cookie", "name": "sid"},
                "bearerAuth": {"type": "http", "scheme": "bearer", "bearerFormat": "JWT"}
            },
            "schemas": {
                "Account": {
                    "type": "object",
                    "required": ["email"],
                    "properties": {
                        "email": {"type": "string"},
                        "profile": {"$ref": "#/components/schemas/Profile"},
                        "backup": {"$ref": "#/components/schemas/Profile"}
                    }
                },
                "Profile": {"type": "object", "properties": {"bio": {"type": "string"}}}
            }
        },
        "paths": {
            "/accounts/{accountId}": {
                "put": {
                    "operationId": "updateAccount",
                    "security": security,
                    "parameters": [
                        {"name": "accountId", "in": "path", "required": true, "schema": {"type": "string"}},
                        {"name": "dryRun", "in": "query", "schema": {"type": "boolean"}}
                    ],
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {"schema": {"$ref": "#/components/schemas/Account"}}
                        }
                    }
                }
            },
            "/health": {
                "get": {"operationId": "health", "security": [{}]}
            }
        }
    })
}

#[test]
fn test_swagger2_document() {
    let registry = DocumentLoader::compile(SWAGGER2_YAML).unwrap();

    assert_eq!(registry.document_version(), DocumentVersion::Swagger2);
    assert_eq!(registry.len(), 2);
    assert!(registry.by_operation_id("admin_sessions").is_none());

    let post = registry.by_operation_id("chat_postMessage").unwrap();
    assert_eq!(post.server_url(), Some("https://chat.example.com/api"));
    assert!(post.requires_oauth);
    assert!(post.requires_bearer_auth);
    assert_eq!(post.oauth_scopes.iter().collect::<Vec<_>>(), vec!["chat:write"]);
    assert_eq!(
        post.request_content_types,
        vec!["application/x-www-form-urlencoded"]
    );
    assert_eq!(post.required_parameters().form, vec!["channel"]);

    let list = registry.get(HttpMethod::Get, "/conversations.list").unwrap();
    assert_eq!(list.oauth_scopes.iter().collect::<Vec<_>>(), vec!["channels:read"]);
    assert_eq!(list.query_parameters.properties["limit"]["default"], 100);

    let (name, scheme) = registry.oauth_scheme().unwrap();
    assert_eq!(name, "slackAuth");
    assert!(matches!(scheme, SecurityScheme::OAuth2 { .. }));
    let endpoints = scheme.oauth_endpoints().unwrap();
    assert_eq!(
        endpoints.authorization_url.as_deref(),
        Some("https://chat.example.com/oauth/authorize")
    );
}

#[test]
fn test_cookie_only_operation_excluded_until_bearer_alternative_added() {
    let registry = DocumentLoader::compile(v3_document(None)).unwrap();
    assert!(registry.by_operation_id("updateAccount").is_none());
    assert!(registry.by_operation_id("health").is_some());

    let registry =
        DocumentLoader::compile(v3_document(Some(json!({"bearerAuth": []})))).unwrap();
    let endpoint = registry.by_operation_id("updateAccount").unwrap();
    assert!(endpoint.requires_bearer_auth);
    assert!(!endpoint.requires_oauth);
}

#[test]
fn test_v3_document_resolves_and_projects() {
    let registry =
        DocumentLoader::compile(v3_document(Some(json!({"bearerAuth": []})))).unwrap();
    let endpoint = registry.get(HttpMethod::Put, "/accounts/{accountId}").unwrap();

    let body = endpoint.request_body_schema.as_ref().unwrap();
    assert_eq!(body["properties"]["profile"]["properties"]["bio"]["type"], "string");
    assert_eq!(body["properties"]["backup"]["properties"]["bio"]["type"], "string");
    assert!(!body.to_string().contains("$ref"));

    let mut values = Map::new();
    values.insert("accountId".to_string(), json!("a/1"));
    assert_eq!(
        endpoint.full_url(None, &values).unwrap(),
        "https://demo.accounts.example.com/v1/accounts/a%2F1"
    );

    let combined = endpoint.to_combined();
    assert_eq!(combined.required_names(), vec!["accountId", "email"]);
    let properties = combined.input_schema["properties"].as_object().unwrap();
    assert_eq!(
        properties.keys().collect::<Vec<_>>(),
        vec!["accountId", "dryRun", "email", "profile", "backup"]
    );
}

#[test]
fn test_json_export_lists_every_endpoint() {
    let registry = DocumentLoader::compile(SWAGGER2_YAML).unwrap();
    let summary = registry.to_json();

    assert_eq!(summary["info"]["title"], "Chat API");
    assert_eq!(summary["endpoints"].as_array().unwrap().len(), 2);
}

const LOOSE_YAML: &str = r#"
openapi: 3.0.0
info:
  title: Loose
  version: 1.0
servers:
  - url: https://loose.example.com
paths:
  /pets:
    get:
      operationId: listPets
  /broken:
    servers:
      - description: no url here
    get:
      operationId: getBroken
  /malformed:
    parameters: not-a-list
    get:
      operationId: getMalformed
"#;

#[test]
fn test_malformed_parts_do_not_reject_document() {
    let registry = DocumentLoader::compile(LOOSE_YAML).unwrap();

    assert_eq!(registry.info().version, "1.0");
    assert_eq!(
        registry.by_operation_id("listPets").unwrap().server_url(),
        Some("https://loose.example.com")
    );
    assert_eq!(
        registry.by_operation_id("getBroken").unwrap().server_url(),
        Some("https://loose.example.com")
    );
    assert!(registry.by_operation_id("getMalformed").is_none());
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_garbage_input_is_fatal() {
    assert!(matches!(
        DocumentLoader::compile(r#"{"openapi": "3.0.0", "paths": "#),
        Err(LoadError::Unparsable)
    ));
}
