//! OAuth client configuration

use std::time::Duration;

use openapi_endpoints::SecurityScheme;
use serde::{Deserialize, Serialize};

use crate::error::{OAuthError, Result};
use crate::token::TokenKey;

pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8000/callback";

/// How long to wait for the browser redirect
pub const DEFAULT_AUTHORIZATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Settings for one OAuth client registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthClientConfig {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub authorization_url: String,
    pub token_url: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Distinguishes tokens of the same client used against several services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub authorization_timeout_secs: u64,
}

fn default_redirect_uri() -> String {
    DEFAULT_REDIRECT_URI.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_AUTHORIZATION_TIMEOUT.as_secs()
}

impl OAuthClientConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: Option<String>,
        authorization_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            authorization_url: authorization_url.into(),
            token_url: token_url.into(),
            redirect_uri: default_redirect_uri(),
            scopes: Vec::new(),
            service_name: None,
            authorization_timeout_secs: default_timeout_secs(),
        }
    }

    /// Take the provider endpoints from a document's OAuth2 scheme
    pub fn from_scheme(
        scheme: &SecurityScheme,
        client_id: impl Into<String>,
        client_secret: Option<String>,
    ) -> Result<Self> {
        let endpoints = scheme.oauth_endpoints().ok_or_else(|| {
            OAuthError::Config("security scheme declares no OAuth2 flow".to_string())
        })?;

        let authorization_url = endpoints
            .authorization_url
            .ok_or_else(|| OAuthError::Config("missing authorization URL".to_string()))?;
        let token_url = endpoints
            .token_url
            .ok_or_else(|| OAuthError::Config("missing token URL".to_string()))?;

        Ok(Self::new(client_id, client_secret, authorization_url, token_url))
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    pub fn with_authorization_timeout(mut self, timeout: Duration) -> Self {
        self.authorization_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn authorization_timeout(&self) -> Duration {
        Duration::from_secs(self.authorization_timeout_secs)
    }

    /// Space-separated `scope` parameter, if any scopes are configured
    pub fn scope_param(&self) -> Option<String> {
        (!self.scopes.is_empty()).then(|| self.scopes.join(" "))
    }

    pub fn token_key(&self) -> TokenKey {
        TokenKey::new(self.client_id.clone(), self.service_name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openapi_endpoints::RawSecurityScheme;
    use serde_json::json;

    fn scheme(value: serde_json::Value) -> SecurityScheme {
        let raw: RawSecurityScheme = serde_json::from_value(value).unwrap();
        SecurityScheme::from_raw(&raw)
    }

    #[test]
    fn test_from_v3_scheme() {
        let scheme = scheme(json!({
            "type": "oauth2",
            "flows": {
                "authorizationCode": {
                    "authorizationUrl": "https://example.com/authorize",
                    "tokenUrl": "https://example.com/token",
                    "scopes": {"read": "Read"}
                }
            }
        }));

        let config = OAuthClientConfig::from_scheme(&scheme, "id", Some("secret".to_string()))
            .unwrap()
            .with_scopes(["read", "write"]);

        assert_eq!(config.authorization_url, "https://example.com/authorize");
        assert_eq!(config.token_url, "https://example.com/token");
        assert_eq!(config.redirect_uri, DEFAULT_REDIRECT_URI);
        assert_eq!(config.scope_param().as_deref(), Some("read write"));
    }

    #[test]
    fn test_from_v2_scheme() {
        let scheme = scheme(json!({
            "type": "oauth2",
            "flow": "accessCode",
            "authorizationUrl": "https://slack.com/oauth/authorize",
            "tokenUrl": "https://slack.com/api/oauth.access"
        }));

        let config = OAuthClientConfig::from_scheme(&scheme, "id", None).unwrap();
        assert_eq!(config.token_url, "https://slack.com/api/oauth.access");
        assert!(config.scope_param().is_none());
    }

    #[test]
    fn test_from_scheme_requires_urls() {
        let implicit = scheme(json!({
            "type": "oauth2",
            "flow": "implicit",
            "authorizationUrl": "https://example.com/authorize"
        }));
        assert!(matches!(
            OAuthClientConfig::from_scheme(&implicit, "id", None),
            Err(OAuthError::Config(_))
        ));

        let bearer = scheme(json!({"type": "http", "scheme": "bearer"}));
        assert!(OAuthClientConfig::from_scheme(&bearer, "id", None).is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: OAuthClientConfig = serde_json::from_value(json!({
            "clientId": "id",
            "authorizationUrl": "https://example.com/a",
            "tokenUrl": "https://example.com/t"
        }))
        .unwrap();

        assert_eq!(config.redirect_uri, DEFAULT_REDIRECT_URI);
        assert_eq!(config.authorization_timeout(), DEFAULT_AUTHORIZATION_TIMEOUT);
        assert_eq!(config.token_key(), TokenKey::new("id", None));
    }
}
