//! Invoker settings management
//!
//! Stores request and OAuth defaults in a plain JSON file. Client secrets
//! never live here; they travel in [`OAuthClientConfig`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use oauth_flow::{FileTokenStore, OAuthClientConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{InvokeError, Result};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// OAuth overrides applied to every client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OAuthSettings {
    /// Redirect URI for the local listener (e.g., "http://localhost:8000/callback")
    pub redirect_uri: Option<String>,
    /// Seconds to wait for the browser redirect
    pub authorization_timeout_secs: Option<u64>,
    /// Token directory; the platform data directory when unset
    pub token_dir: Option<PathBuf>,
    /// Service name used to key stored tokens
    pub service_name: Option<String>,
}

impl OAuthSettings {
    /// Token store for the configured directory
    pub fn token_store(&self) -> oauth_flow::Result<FileTokenStore> {
        match &self.token_dir {
            Some(dir) => Ok(FileTokenStore::with_dir(dir)),
            None => FileTokenStore::new(),
        }
    }

    /// Fill a client configuration with these overrides
    pub fn apply(&self, mut config: OAuthClientConfig) -> OAuthClientConfig {
        if let Some(redirect_uri) = &self.redirect_uri {
            config = config.with_redirect_uri(redirect_uri.as_str());
        }
        if let Some(secs) = self.authorization_timeout_secs {
            config = config.with_authorization_timeout(Duration::from_secs(secs));
        }
        if config.service_name.is_none() {
            if let Some(service_name) = &self.service_name {
                config = config.with_service_name(service_name.as_str());
            }
        }
        config
    }
}

/// Invoker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokerSettings {
    /// Settings file version
    pub version: u32,
    /// Per-request timeout in seconds (0 = none)
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub oauth: OAuthSettings,
}

impl InvokerSettings {
    pub fn new() -> Self {
        Self {
            version: 1,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            oauth: OAuthSettings::default(),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

impl Default for InvokerSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings manager
pub struct SettingsManager {
    settings_file: PathBuf,
    settings: InvokerSettings,
}

impl SettingsManager {
    /// Load `settings.json` from a directory, falling back to defaults
    pub fn new(storage_dir: &Path) -> Self {
        let settings_file = storage_dir.join("settings.json");
        let settings = Self::load_from_file(&settings_file).unwrap_or_else(|e| {
            warn!("Ignoring unreadable settings file {:?}: {}", settings_file, e);
            InvokerSettings::default()
        });

        Self {
            settings_file,
            settings,
        }
    }

    /// Use the platform configuration directory
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(&Self::default_dir()?))
    }

    pub fn default_dir() -> Result<PathBuf> {
        ProjectDirs::from("com", "swagger-mcp", "openapi-invoker")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .ok_or_else(|| InvokeError::Settings("Could not determine config directory".to_string()))
    }

    fn load_from_file(path: &Path) -> Result<InvokerSettings> {
        if !path.exists() {
            debug!("No settings file found, using defaults");
            return Ok(InvokerSettings::new());
        }

        let contents = std::fs::read_to_string(path)?;
        let settings: InvokerSettings = serde_json::from_str(&contents)?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.settings_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(&self.settings)?;

        // Write atomically using temp file
        let temp_path = self.settings_file.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, &self.settings_file).await?;

        debug!("Saved settings to {:?}", self.settings_file);
        Ok(())
    }

    pub fn get(&self) -> &InvokerSettings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut InvokerSettings {
        &mut self.settings
    }

    /// Update settings and save
    pub async fn update(&mut self, settings: InvokerSettings) -> Result<()> {
        self.settings = settings;
        self.save().await
    }

    /// Reset settings to defaults and delete the settings file
    pub async fn reset(&mut self) -> Result<()> {
        self.settings = InvokerSettings::default();

        if self.settings_file.exists() {
            tokio::fs::remove_file(&self.settings_file).await?;
        }

        Ok(())
    }
}
