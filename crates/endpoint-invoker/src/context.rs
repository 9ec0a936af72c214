//! Shared invocation state: HTTP client, OAuth engine and defaults

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexSet;
use oauth_flow::{OAuthClientConfig, OAuthFlowEngine};
use openapi_endpoints::InvocableEndpoint;
use reqwest::Client;
use tracing::debug;

use crate::builder::RequestBuilder;
use crate::error::Result;
use crate::settings::{InvokerSettings, DEFAULT_REQUEST_TIMEOUT_SECS};

struct OAuthBinding {
    engine: Arc<OAuthFlowEngine>,
    config: OAuthClientConfig,
}

/// Built once and passed to every invocation
pub struct InvocationContext {
    http: Client,
    oauth: Option<OAuthBinding>,
    default_timeout: Option<Duration>,
}

impl InvocationContext {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
            oauth: None,
            default_timeout: Some(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
        }
    }

    /// Apply request defaults from persisted settings
    pub fn from_settings(settings: &InvokerSettings) -> Self {
        Self::new().with_default_timeout(settings.request_timeout())
    }

    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    /// Acquire tokens for OAuth-protected endpoints through this engine
    pub fn with_oauth(mut self, engine: Arc<OAuthFlowEngine>, config: OAuthClientConfig) -> Self {
        self.oauth = Some(OAuthBinding { engine, config });
        self
    }

    /// Build the OAuth engine from settings (token directory, redirect URI,
    /// timeout, service name) and attach it
    pub fn with_oauth_settings(
        self,
        settings: &InvokerSettings,
        config: OAuthClientConfig,
    ) -> Result<Self> {
        let store = settings.oauth.token_store()?;
        let engine = OAuthFlowEngine::new(Arc::new(store)).with_http_client(self.http.clone());
        let config = settings.oauth.apply(config);
        Ok(self.with_oauth(Arc::new(engine), config))
    }

    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    pub fn oauth_config(&self) -> Option<&OAuthClientConfig> {
        self.oauth.as_ref().map(|binding| &binding.config)
    }

    /// Request builder for one endpoint
    pub fn builder<'a, E>(&'a self, endpoint: &'a E) -> RequestBuilder<'a, E>
    where
        E: InvocableEndpoint + ?Sized,
    {
        RequestBuilder::new(endpoint, self)
    }

    /// Access token from the configured engine; `None` without one. The
    /// endpoint's scopes are requested when the client config names none.
    pub async fn oauth_token(&self, scopes: &IndexSet<String>) -> Result<Option<String>> {
        let Some(binding) = &self.oauth else {
            debug!("No OAuth engine configured");
            return Ok(None);
        };

        let token = if binding.config.scopes.is_empty() && !scopes.is_empty() {
            let config = binding.config.clone().with_scopes(scopes.iter().cloned());
            binding.engine.get_access_token(&config, false).await?
        } else {
            binding.engine.get_access_token(&binding.config, false).await?
        };
        Ok(Some(token))
    }
}

impl Default for InvocationContext {
    fn default() -> Self {
        Self::new()
    }
}
