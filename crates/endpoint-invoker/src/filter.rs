//! Endpoint selection by server URL and path patterns

use openapi_endpoints::{Endpoint, EndpointRegistry};
use regex::Regex;

/// Keeps endpoints whose server matches and whose path matches `include`
/// but not `exclude`. Patterns are anchored at the start of the path.
#[derive(Debug, Clone, Default)]
pub struct EndpointFilter {
    server_url: Option<String>,
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl EndpointFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = Some(server_url.into());
        self
    }

    pub fn include(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.include = Some(anchored(pattern)?);
        Ok(self)
    }

    pub fn exclude(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.exclude = Some(anchored(pattern)?);
        Ok(self)
    }

    pub fn matches(&self, endpoint: &Endpoint) -> bool {
        if let Some(server_url) = &self.server_url {
            if endpoint.server_url() != Some(server_url.as_str()) {
                return false;
            }
        }
        if let Some(include) = &self.include {
            if !include.is_match(&endpoint.path) {
                return false;
            }
        }
        !self
            .exclude
            .as_ref()
            .is_some_and(|exclude| exclude.is_match(&endpoint.path))
    }

    /// Drop every endpoint that does not match
    pub fn apply(&self, registry: &mut EndpointRegistry) {
        registry.retain(|endpoint| self.matches(endpoint));
    }
}

fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})", pattern))
}
