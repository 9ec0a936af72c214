//! Persisted OAuth tokens
//!
//! One JSON file per (service, client) pair. There is no cross-process
//! locking; the last write wins.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{OAuthError, Result};

/// A token as returned by the provider, plus bookkeeping fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    /// Absolute expiry, unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    /// Provider fields kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Token {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: None,
            expires_in: None,
            expires_at: None,
            scope: None,
            client_id: None,
            service_name: None,
            extra: Map::new(),
        }
    }

    /// Usable only with a known expiry that lies in the future
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|expires_at| now.timestamp() < expires_at)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Derive `expires_at` from `expires_in` when only the latter is known
    pub fn stamp_expiry(&mut self, now: DateTime<Utc>) {
        if self.expires_at.is_none() {
            if let Some(expires_in) = self.expires_in {
                self.expires_at = Some(now.timestamp() + expires_in);
            }
        }
    }
}

/// Identity under which a token is stored
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenKey {
    pub client_id: String,
    pub service_name: Option<String>,
}

impl TokenKey {
    pub fn new(client_id: impl Into<String>, service_name: Option<String>) -> Self {
        Self {
            client_id: client_id.into(),
            service_name,
        }
    }

    /// `{service}_{client}_token.json`, or `{client}_token.json` without a service
    pub fn file_name(&self) -> String {
        let stem = match &self.service_name {
            Some(service) => format!("{}_{}", service, self.client_id),
            None => self.client_id.clone(),
        };
        format!("{}_token.json", stem.replace(['/', '\\'], "_"))
    }
}

/// Trait for token persistence backends
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load a token; `None` when nothing usable is stored
    async fn load(&self, key: &TokenKey) -> Result<Option<Token>>;

    /// Persist a token, replacing any previous one
    async fn save(&self, key: &TokenKey, token: &Token) -> Result<()>;

    /// Remove a stored token if present
    async fn delete(&self, key: &TokenKey) -> Result<()>;
}

/// Stores each token as a JSON file in one directory
pub struct FileTokenStore {
    storage_dir: PathBuf,
}

impl FileTokenStore {
    /// Store in the platform data directory
    pub fn new() -> Result<Self> {
        Ok(Self::with_dir(Self::default_dir()?))
    }

    /// Store in a custom directory
    pub fn with_dir(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
        }
    }

    /// Default token directory
    pub fn default_dir() -> Result<PathBuf> {
        ProjectDirs::from("com", "swagger-mcp", "openapi-invoker")
            .map(|dirs| dirs.data_dir().join("tokens"))
            .ok_or_else(|| OAuthError::Storage("Could not determine data directory".to_string()))
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn token_path(&self, key: &TokenKey) -> PathBuf {
        self.storage_dir.join(key.file_name())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self, key: &TokenKey) -> Result<Option<Token>> {
        let path = self.token_path(key);
        if !path.exists() {
            debug!("No stored token at {:?}", path);
            return Ok(None);
        }

        let contents = tokio::fs::read_to_string(&path).await?;
        match serde_json::from_str(&contents) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!("Ignoring unreadable token file {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    async fn save(&self, key: &TokenKey, token: &Token) -> Result<()> {
        tokio::fs::create_dir_all(&self.storage_dir).await?;

        let mut token = token.clone();
        token.stamp_expiry(Utc::now());
        token.client_id = Some(key.client_id.clone());
        token.service_name = key.service_name.clone();

        let path = self.token_path(key);
        let contents = serde_json::to_string_pretty(&token)?;

        // Write atomically using temp file
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        debug!("Saved token to {:?}", path);
        Ok(())
    }

    async fn delete(&self, key: &TokenKey) -> Result<()> {
        let path = self.token_path(key);
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
            debug!("Deleted token {:?}", path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_token_file_names() {
        assert_eq!(
            TokenKey::new("abc", Some("slack".to_string())).file_name(),
            "slack_abc_token.json"
        );
        assert_eq!(TokenKey::new("abc", None).file_name(), "abc_token.json");
    }

    #[test]
    fn test_validity_requires_future_expiry() {
        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        let mut token = Token::new("t");
        assert!(!token.is_valid_at(now));

        token.expires_at = Some(1_001);
        assert!(token.is_valid_at(now));

        token.expires_at = Some(1_000);
        assert!(!token.is_valid_at(now));
    }

    #[test]
    fn test_stamp_expiry_keeps_existing_value() {
        let now = Utc.timestamp_opt(1_000, 0).unwrap();

        let mut token = Token::new("t");
        token.expires_in = Some(3600);
        token.stamp_expiry(now);
        assert_eq!(token.expires_at, Some(4_600));

        token.expires_in = Some(10);
        token.stamp_expiry(now);
        assert_eq!(token.expires_at, Some(4_600));
    }

    #[test]
    fn test_provider_fields_are_preserved() {
        let token: Token = serde_json::from_value(json!({
            "access_token": "xoxp-1",
            "ok": true,
            "team": {"id": "T1"}
        }))
        .unwrap();

        assert_eq!(token.extra["ok"], true);
        let round = serde_json::to_value(&token).unwrap();
        assert_eq!(round["team"]["id"], "T1");
        assert!(round.get("refresh_token").is_none());
    }

    #[tokio::test]
    async fn test_file_store_save_load_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileTokenStore::with_dir(temp_dir.path().join("tokens"));
        let key = TokenKey::new("client", Some("svc".to_string()));

        assert!(store.load(&key).await.unwrap().is_none());

        let mut token = Token::new("access");
        token.expires_in = Some(60);
        store.save(&key, &token).await.unwrap();

        let loaded = store.load(&key).await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "access");
        assert!(loaded.expires_at.is_some());
        assert!(loaded.is_valid());
        assert_eq!(loaded.client_id.as_deref(), Some("client"));
        assert!(store.token_path(&key).ends_with("svc_client_token.json"));

        store.delete(&key).await.unwrap();
        assert!(store.load(&key).await.unwrap().is_none());
        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_token_file_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileTokenStore::with_dir(temp_dir.path());
        let key = TokenKey::new("client", None);

        std::fs::write(store.token_path(&key), "not json").unwrap();
        assert!(store.load(&key).await.unwrap().is_none());
    }
}
