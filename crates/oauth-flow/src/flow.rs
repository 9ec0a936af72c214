//! Authorization-code flow with refresh and token caching

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{BrowserLauncher, SystemBrowser};
use crate::callback::CallbackListener;
use crate::config::OAuthClientConfig;
use crate::error::{OAuthError, Result};
use crate::token::{FileTokenStore, Token, TokenStore};

/// Drives authorization, refresh and token persistence
pub struct OAuthFlowEngine {
    http: reqwest::Client,
    store: Arc<dyn TokenStore>,
    browser: Arc<dyn BrowserLauncher>,
}

impl OAuthFlowEngine {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            store,
            browser: Arc::new(SystemBrowser),
        }
    }

    /// Engine backed by files in the platform data directory
    pub fn with_default_store() -> Result<Self> {
        Ok(Self::new(Arc::new(FileTokenStore::new()?)))
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Return a usable access token.
    ///
    /// A stored unexpired token is returned without any network call. An
    /// expired one is refreshed when it carries a refresh token. Otherwise,
    /// or when `force_refresh` is set, the interactive flow runs.
    pub async fn get_access_token(
        &self,
        config: &OAuthClientConfig,
        force_refresh: bool,
    ) -> Result<String> {
        let key = config.token_key();
        let existing = if force_refresh {
            None
        } else {
            self.store.load(&key).await?
        };

        if let Some(token) = existing {
            if token.is_valid() {
                debug!("Using cached token for client {}", config.client_id);
                return Ok(token.access_token);
            }

            if let Some(refresh_token) = &token.refresh_token {
                match self.refresh_token(config, refresh_token).await {
                    Ok(refreshed) => return Ok(refreshed.access_token),
                    Err(e) => warn!("Token refresh failed, re-authorizing: {}", e),
                }
            }
        }

        let token = self.authorize(config).await?;
        Ok(token.access_token)
    }

    /// Exchange a refresh token. A response without a refresh token keeps
    /// the one that was used.
    pub async fn refresh_token(
        &self,
        config: &OAuthClientConfig,
        refresh_token: &str,
    ) -> Result<Token> {
        info!("Refreshing access token for client {}", config.client_id);

        let mut params = vec![
            ("client_id", config.client_id.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        if let Some(secret) = &config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        let mut token = self.request_token(&config.token_url, &params).await?;
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }

        self.store.save(&config.token_key(), &token).await?;
        Ok(token)
    }

    /// Run the interactive authorization-code flow and persist the result
    pub async fn authorize(&self, config: &OAuthClientConfig) -> Result<Token> {
        let mut listener = CallbackListener::bind(&config.redirect_uri).await?;
        let redirect_uri = listener.redirect_uri().to_string();

        let result = self.authorize_with(config, &mut listener, &redirect_uri).await;
        listener.shutdown().await;
        result
    }

    async fn authorize_with(
        &self,
        config: &OAuthClientConfig,
        listener: &mut CallbackListener,
        redirect_uri: &str,
    ) -> Result<Token> {
        let auth_url = Self::authorization_url(config, redirect_uri)?;

        info!("Opening browser for authorization: {}", auth_url);
        self.open_browser(&auth_url).await;

        let code = listener
            .wait_for_code(config.authorization_timeout())
            .await?;

        info!("Exchanging authorization code for access token");
        let mut params = vec![
            ("client_id", config.client_id.as_str()),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];
        if let Some(secret) = &config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        let token = self.request_token(&config.token_url, &params).await?;
        self.store.save(&config.token_key(), &token).await?;
        Ok(token)
    }

    /// Launching a browser blocks, so it runs off the async workers
    async fn open_browser(&self, auth_url: &str) {
        let browser = self.browser.clone();
        let url = auth_url.to_string();
        let opened = tokio::task::spawn_blocking(move || browser.open(&url)).await;

        match opened {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("{}; open this URL manually: {}", e, auth_url),
            Err(e) => warn!(
                "Browser launcher failed ({}); open this URL manually: {}",
                e, auth_url
            ),
        }
    }

    /// Forget the stored token for this client
    pub async fn delete_token(&self, config: &OAuthClientConfig) -> Result<()> {
        self.store.delete(&config.token_key()).await
    }

    /// Provider authorization URL with the code-flow parameters appended
    pub fn authorization_url(config: &OAuthClientConfig, redirect_uri: &str) -> Result<String> {
        let mut url = Url::parse(&config.authorization_url).map_err(|e| {
            OAuthError::Config(format!(
                "invalid authorization URL '{}': {}",
                config.authorization_url, e
            ))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &config.client_id)
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("response_type", "code");
            if let Some(scope) = config.scope_param() {
                query.append_pair("scope", &scope);
            }
        }

        Ok(url.into())
    }

    async fn request_token(&self, token_url: &str, params: &[(&str, &str)]) -> Result<Token> {
        let response = self.http.post(token_url).form(params).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(OAuthError::TokenExchange {
                status: status.as_u16(),
                body,
            });
        }

        // Some providers report failures as 200 with an `error` field
        let value: Value = serde_json::from_str(&body)?;
        if value.get("access_token").and_then(Value::as_str).is_none() {
            let reason = value
                .get("error")
                .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()))
                .unwrap_or(body);
            return Err(OAuthError::TokenExchange {
                status: status.as_u16(),
                body: reason,
            });
        }

        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKey;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Follows the redirect the way a browser would after user consent
    struct RedirectingBrowser {
        query: Option<String>,
        opened: Mutex<Vec<String>>,
    }

    impl RedirectingBrowser {
        fn new(query: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                query: query.map(str::to_string),
                opened: Mutex::new(Vec::new()),
            })
        }

        fn opened(&self) -> Vec<String> {
            self.opened.lock().unwrap().clone()
        }
    }

    impl BrowserLauncher for RedirectingBrowser {
        fn open(&self, url: &str) -> Result<()> {
            self.opened.lock().unwrap().push(url.to_string());

            if let Some(query) = &self.query {
                let parsed = Url::parse(url).unwrap();
                let redirect = parsed
                    .query_pairs()
                    .find(|(k, _)| k == "redirect_uri")
                    .map(|(_, v)| v.into_owned())
                    .unwrap();
                let target = format!("{}?{}", redirect, query);
                tokio::spawn(async move {
                    let _ = reqwest::get(&target).await;
                });
            }
            Ok(())
        }
    }

    struct Fixture {
        _dir: TempDir,
        store: Arc<FileTokenStore>,
        server: MockServer,
    }

    impl Fixture {
        async fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let store = Arc::new(FileTokenStore::with_dir(dir.path()));
            Self {
                _dir: dir,
                store,
                server: MockServer::start().await,
            }
        }

        fn config(&self) -> OAuthClientConfig {
            OAuthClientConfig::new(
                "client-1",
                Some("secret".to_string()),
                format!("{}/authorize", self.server.uri()),
                format!("{}/token", self.server.uri()),
            )
            .with_redirect_uri("http://127.0.0.1:0/callback")
            .with_service_name("svc")
            .with_authorization_timeout(Duration::from_secs(1))
        }

        fn engine(&self, browser: Arc<RedirectingBrowser>) -> OAuthFlowEngine {
            OAuthFlowEngine::new(self.store.clone()).with_browser(browser)
        }

        async fn seed(&self, token: Token) {
            self.store
                .save(&self.config().token_key(), &token)
                .await
                .unwrap();
        }
    }

    fn token(access: &str, refresh: Option<&str>, expires_at: i64) -> Token {
        let mut token = Token::new(access);
        token.refresh_token = refresh.map(str::to_string);
        token.expires_at = Some(expires_at);
        token
    }

    #[tokio::test]
    async fn test_cached_token_needs_no_network() {
        let fixture = Fixture::new().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&fixture.server)
            .await;
        fixture
            .seed(token("cached", Some("r"), Utc::now().timestamp() + 600))
            .await;

        let browser = RedirectingBrowser::new(None);
        let engine = fixture.engine(browser.clone());

        let access = engine
            .get_access_token(&fixture.config(), false)
            .await
            .unwrap();
        assert_eq!(access, "cached");
        assert!(browser.opened().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_preserves_refresh_token() {
        let fixture = Fixture::new().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&fixture.server)
            .await;
        fixture
            .seed(token("stale", Some("old-refresh"), Utc::now().timestamp() - 10))
            .await;

        let engine = fixture.engine(RedirectingBrowser::new(None));
        let access = engine
            .get_access_token(&fixture.config(), false)
            .await
            .unwrap();
        assert_eq!(access, "fresh");

        let stored = fixture
            .store
            .load(&fixture.config().token_key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.access_token, "fresh");
        assert_eq!(stored.refresh_token.as_deref(), Some("old-refresh"));
        assert!(stored.is_valid());
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_authorization() {
        let fixture = Fixture::new().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .expect(1)
            .mount(&fixture.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .and(body_string_contains("client_secret=secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "authorized",
                "refresh_token": "new-refresh",
                "expires_in": 3600,
                "team": "T1"
            })))
            .expect(1)
            .mount(&fixture.server)
            .await;
        fixture
            .seed(token("stale", Some("revoked"), Utc::now().timestamp() - 10))
            .await;

        let browser = RedirectingBrowser::new(Some("code=the-code"));
        let engine = fixture.engine(browser.clone());
        let access = engine
            .get_access_token(&fixture.config(), false)
            .await
            .unwrap();

        assert_eq!(access, "authorized");
        assert_eq!(browser.opened().len(), 1);

        let stored = fixture
            .store
            .load(&TokenKey::new("client-1", Some("svc".to_string())))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("new-refresh"));
        assert_eq!(stored.extra["team"], "T1");
    }

    #[tokio::test]
    async fn test_force_refresh_skips_cache() {
        let fixture = Fixture::new().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "forced"
            })))
            .mount(&fixture.server)
            .await;
        fixture
            .seed(token("cached", None, Utc::now().timestamp() + 600))
            .await;

        let engine = fixture.engine(RedirectingBrowser::new(Some("code=c")));
        let access = engine
            .get_access_token(&fixture.config(), true)
            .await
            .unwrap();
        assert_eq!(access, "forced");
    }

    #[tokio::test]
    async fn test_provider_error_leaves_stored_token() {
        let fixture = Fixture::new().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&fixture.server)
            .await;
        let expired = token("expired", None, Utc::now().timestamp() - 10);
        fixture.seed(expired.clone()).await;

        let engine = fixture.engine(RedirectingBrowser::new(Some("error=access_denied")));
        let err = engine
            .get_access_token(&fixture.config(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::Authorization(e) if e == "access_denied"));

        let stored = fixture
            .store
            .load(&fixture.config().token_key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.access_token, "expired");
    }

    #[tokio::test]
    async fn test_authorization_timeout() {
        let fixture = Fixture::new().await;
        let engine = fixture.engine(RedirectingBrowser::new(None));

        let err = engine.authorize(&fixture.config()).await.unwrap_err();
        assert!(matches!(err, OAuthError::Timeout(_)));
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[tokio::test]
    async fn test_fixed_port_is_released_after_failed_authorization() {
        let fixture = Fixture::new().await;
        let redirect_uri = format!("http://127.0.0.1:{}/callback", free_port());
        let config = fixture.config().with_redirect_uri(redirect_uri.as_str());

        let engine = fixture.engine(RedirectingBrowser::new(None));
        let err = engine.authorize(&config).await.unwrap_err();
        assert!(matches!(err, OAuthError::Timeout(_)));

        let engine = fixture.engine(RedirectingBrowser::new(Some("error=access_denied")));
        let err = engine.authorize(&config).await.unwrap_err();
        assert!(matches!(err, OAuthError::Authorization(e) if e == "access_denied"));

        let mut listener = CallbackListener::bind(&redirect_uri).await.unwrap();
        listener.shutdown().await;
    }

    #[tokio::test]
    async fn test_token_endpoint_error_in_body() {
        let fixture = Fixture::new().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": false,
                "error": "invalid_code"
            })))
            .mount(&fixture.server)
            .await;

        let engine = fixture.engine(RedirectingBrowser::new(Some("code=bad")));
        let err = engine.authorize(&fixture.config()).await.unwrap_err();
        assert!(matches!(
            err,
            OAuthError::TokenExchange { status: 200, ref body } if body == "invalid_code"
        ));
    }

    #[test]
    fn test_authorization_url() {
        let config = OAuthClientConfig::new(
            "my client",
            None,
            "https://provider.example.com/authorize?team=T1",
            "https://provider.example.com/token",
        )
        .with_scopes(["chat:write", "channels:read"]);

        let url = OAuthFlowEngine::authorization_url(&config, "http://localhost:8000/callback")
            .unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert_eq!(
            pairs,
            vec![
                ("team".to_string(), "T1".to_string()),
                ("client_id".to_string(), "my client".to_string()),
                (
                    "redirect_uri".to_string(),
                    "http://localhost:8000/callback".to_string()
                ),
                ("response_type".to_string(), "code".to_string()),
                ("scope".to_string(), "chat:write channels:read".to_string()),
            ]
        );
    }
}
