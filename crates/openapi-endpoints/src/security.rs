//! Security scheme normalization and per-operation classification

use indexmap::{IndexMap, IndexSet};

use crate::types::*;

impl SecurityScheme {
    /// Normalize a v2 `securityDefinitions` or v3 `securitySchemes` entry
    pub fn from_raw(raw: &RawSecurityScheme) -> Self {
        match raw.scheme_type.as_str() {
            "apiKey" => SecurityScheme::ApiKey {
                name: raw.name.clone().unwrap_or_default(),
                location: match raw.location.as_deref() {
                    Some("query") => ApiKeyLocation::Query,
                    Some("cookie") => ApiKeyLocation::Cookie,
                    _ => ApiKeyLocation::Header,
                },
            },
            "http" => SecurityScheme::Http {
                scheme: raw.scheme.clone().unwrap_or_default(),
                bearer_format: raw.bearer_format.clone(),
            },
            // Swagger 2.0 spelling of HTTP basic
            "basic" => SecurityScheme::Http {
                scheme: "basic".to_string(),
                bearer_format: None,
            },
            "oauth2" => SecurityScheme::OAuth2 {
                flows: match &raw.flows {
                    Some(flows) => convert_v3_flows(flows),
                    None => convert_v2_flow(raw),
                },
            },
            "openIdConnect" => SecurityScheme::OpenIdConnect {
                openid_connect_url: raw.openid_connect_url.clone().unwrap_or_default(),
            },
            other => SecurityScheme::Other {
                scheme_type: other.to_string(),
            },
        }
    }

    /// HTTP bearer, or OAuth2 with at least one declared flow
    pub fn is_bearer(&self) -> bool {
        match self {
            SecurityScheme::Http { scheme, .. } => scheme.eq_ignore_ascii_case("bearer"),
            SecurityScheme::OAuth2 { flows } => flows.has_flows(),
            _ => false,
        }
    }

    pub fn is_oauth(&self) -> bool {
        matches!(self, SecurityScheme::OAuth2 { .. })
    }

    /// Authorization URL, token URL and declared scopes of an OAuth2 scheme
    pub fn oauth_endpoints(&self) -> Option<OAuthEndpoints> {
        let SecurityScheme::OAuth2 { flows } = self else {
            return None;
        };
        let flow = flows.interactive()?;

        Some(OAuthEndpoints {
            authorization_url: flow.authorization_url.clone(),
            token_url: flow.token_url.clone(),
            scopes: flow.scopes.clone(),
        })
    }
}

/// Endpoints of an OAuth2 provider as declared by the document
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthEndpoints {
    pub authorization_url: Option<String>,
    pub token_url: Option<String>,
    pub scopes: IndexMap<String, String>,
}

fn convert_flow(raw: &RawOAuth2Flow) -> OAuth2Flow {
    OAuth2Flow {
        authorization_url: raw.authorization_url.clone(),
        token_url: raw.token_url.clone(),
        refresh_url: raw.refresh_url.clone(),
        scopes: raw.scopes.clone(),
    }
}

fn convert_v3_flows(raw: &RawOAuth2Flows) -> OAuth2Flows {
    OAuth2Flows {
        authorization_code: raw
            .authorization_code
            .as_ref()
            .or(raw.access_code.as_ref())
            .map(convert_flow),
        implicit: raw.implicit.as_ref().map(convert_flow),
        password: raw.password.as_ref().map(convert_flow),
        client_credentials: raw.client_credentials.as_ref().map(convert_flow),
    }
}

fn convert_v2_flow(raw: &RawSecurityScheme) -> OAuth2Flows {
    let flow = OAuth2Flow {
        authorization_url: raw.authorization_url.clone(),
        token_url: raw.token_url.clone(),
        refresh_url: None,
        scopes: raw.scopes.clone(),
    };

    let mut flows = OAuth2Flows::default();
    match raw.flow.as_deref() {
        Some("implicit") => flows.implicit = Some(flow),
        Some("password") => flows.password = Some(flow),
        Some("application") => flows.client_credentials = Some(flow),
        Some(_) => flows.authorization_code = Some(flow),
        None if raw.authorization_url.is_some() => {
            if raw.token_url.is_some() {
                flows.authorization_code = Some(flow);
            } else {
                flows.implicit = Some(flow);
            }
        }
        None => {}
    }
    flows
}

/// Authentication needs of one operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityProfile {
    pub requires_bearer_auth: bool,
    pub requires_oauth: bool,
    pub oauth_scopes: IndexSet<String>,
    /// False when no alternative can be satisfied by the invoker
    pub reachable: bool,
}

/// Classifies security requirements against a document's declared schemes
#[derive(Debug, Clone, Default)]
pub struct SecurityClassifier {
    schemes: IndexMap<String, SecurityScheme>,
    has_bearer_schemes: bool,
}

impl SecurityClassifier {
    /// Build from v3 `components.securitySchemes`, falling back to v2
    /// `securityDefinitions` when the former is empty
    pub fn from_document(raw: &RawDocument) -> Self {
        let declared = raw
            .components
            .as_ref()
            .map(|c| &c.security_schemes)
            .filter(|s| !s.is_empty())
            .unwrap_or(&raw.security_definitions);

        Self::new(
            declared
                .iter()
                .map(|(name, scheme)| (name.clone(), SecurityScheme::from_raw(scheme)))
                .collect(),
        )
    }

    pub fn new(schemes: IndexMap<String, SecurityScheme>) -> Self {
        let has_bearer_schemes = schemes.values().any(SecurityScheme::is_bearer);
        Self {
            schemes,
            has_bearer_schemes,
        }
    }

    pub fn schemes(&self) -> &IndexMap<String, SecurityScheme> {
        &self.schemes
    }

    pub fn scheme(&self, name: &str) -> Option<&SecurityScheme> {
        self.schemes.get(name)
    }

    pub fn has_bearer_schemes(&self) -> bool {
        self.has_bearer_schemes
    }

    pub fn is_bearer(&self, name: &str) -> bool {
        self.scheme(name).is_some_and(SecurityScheme::is_bearer)
    }

    pub fn is_oauth(&self, name: &str) -> bool {
        self.scheme(name).is_some_and(SecurityScheme::is_oauth)
    }

    /// Classify an effective requirement list (alternatives are OR-ed)
    pub fn classify(&self, requirements: &[SecurityRequirement]) -> SecurityProfile {
        let requires_bearer_auth = self.has_bearer_schemes
            && requirements
                .iter()
                .any(|alt| alt.keys().any(|name| self.is_bearer(name)));

        let requires_oauth = requirements
            .iter()
            .any(|alt| alt.keys().any(|name| self.is_oauth(name)));

        let oauth_scopes = requirements
            .iter()
            .flat_map(|alt| alt.iter())
            .filter(|(name, _)| self.is_oauth(name))
            .flat_map(|(_, scopes)| scopes.iter().cloned())
            .collect();

        SecurityProfile {
            requires_bearer_auth,
            requires_oauth,
            oauth_scopes,
            reachable: self.is_reachable(requirements),
        }
    }

    /// An operation is unreachable only when every alternative consists solely
    /// of schemes that are neither bearer nor OAuth (cookie sessions and the
    /// like). An empty alternative means "no authentication".
    fn is_reachable(&self, requirements: &[SecurityRequirement]) -> bool {
        requirements.is_empty()
            || requirements.iter().any(|alt| {
                alt.is_empty()
                    || alt
                        .keys()
                        .any(|name| self.is_bearer(name) || self.is_oauth(name))
            })
    }
}
