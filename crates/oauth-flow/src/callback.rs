//! Transient local listener for the OAuth redirect
//!
//! Binds the host, port and path of the redirect URI, accepts the first
//! request carrying `code` or `error`, and hands it to the waiting flow over
//! a one-shot channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::error::{OAuthError, Result};

/// What the provider sent back through the browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Code(String),
    Error(String),
}

#[derive(Clone)]
struct CallbackState {
    outcome: Arc<Mutex<Option<oneshot::Sender<CallbackOutcome>>>>,
}

/// How long in-flight redirect responses may take to finish on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A running redirect listener. Call [`CallbackListener::shutdown`] to
/// release the port; dropping it only aborts the server task.
pub struct CallbackListener {
    redirect_uri: String,
    outcome: oneshot::Receiver<CallbackOutcome>,
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
}

impl CallbackListener {
    /// Start listening on the redirect URI. Port 0 picks a free port and the
    /// effective redirect URI is rewritten accordingly.
    pub async fn bind(redirect_uri: &str) -> Result<Self> {
        let mut url = Url::parse(redirect_uri)
            .map_err(|e| OAuthError::Config(format!("invalid redirect URI '{}': {}", redirect_uri, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| OAuthError::Config(format!("redirect URI '{}' has no host", redirect_uri)))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url.port_or_known_default().unwrap_or(80);
        let path = match url.path() {
            "" => "/".to_string(),
            path => path.to_string(),
        };

        let listener = TcpListener::bind((host.as_str(), port))
            .await
            .map_err(|e| OAuthError::Listener(format!("cannot bind {}:{}: {}", host, port, e)))?;
        let local = listener.local_addr()?;
        if port == 0 {
            url.set_port(Some(local.port()))
                .map_err(|_| OAuthError::Config("cannot set redirect port".to_string()))?;
        }

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let state = CallbackState {
            outcome: Arc::new(Mutex::new(Some(outcome_tx))),
        };
        let app = Router::new()
            .route(&path, get(handle_redirect))
            .with_state(state);

        let server = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                warn!("Redirect listener stopped with error: {}", e);
            }
        });

        debug!("Redirect listener bound on {} (path {})", local, path);

        Ok(Self {
            redirect_uri: url.to_string(),
            outcome: outcome_rx,
            shutdown: Some(shutdown_tx),
            server: Some(server),
        })
    }

    /// Redirect URI the provider must send the browser to
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Wait for the redirect; returns the authorization code
    pub async fn wait_for_code(&mut self, timeout: Duration) -> Result<String> {
        match tokio::time::timeout(timeout, &mut self.outcome).await {
            Err(_) => Err(OAuthError::Timeout(timeout)),
            Ok(Err(_)) => Err(OAuthError::Listener(
                "redirect listener closed before a response arrived".to_string(),
            )),
            Ok(Ok(CallbackOutcome::Code(code))) => Ok(code),
            Ok(Ok(CallbackOutcome::Error(error))) => Err(OAuthError::Authorization(error)),
        }
    }

    /// Stop the server and wait until the socket is released
    pub async fn shutdown(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let Some(mut server) = self.server.take() else {
            return;
        };

        if tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err() {
            warn!("Redirect listener did not stop in time, aborting it");
            server.abort();
            let _ = server.await;
        }
        debug!("Redirect listener shut down");
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}

async fn handle_redirect(
    State(state): State<CallbackState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Html<String>) {
    let (outcome, response) = if let Some(error) = params.get("error") {
        (
            Some(CallbackOutcome::Error(error.clone())),
            (
                StatusCode::BAD_REQUEST,
                page(
                    "Authorization Failed",
                    &format!("Error: {}", html_escape(error)),
                ),
            ),
        )
    } else if let Some(code) = params.get("code") {
        (
            Some(CallbackOutcome::Code(code.clone())),
            (
                StatusCode::OK,
                page(
                    "Authorization Successful",
                    "You have successfully authorized the application.",
                ),
            ),
        )
    } else {
        (
            None,
            (
                StatusCode::BAD_REQUEST,
                page("Authorization Failed", "No authorization code was received."),
            ),
        )
    };

    if let Some(outcome) = outcome {
        if let Some(sender) = state.outcome.lock().await.take() {
            let _ = sender.send(outcome);
        }
    }
    response
}

fn page(title: &str, message: &str) -> Html<String> {
    Html(format!(
        "<html><head><title>{title}</title></head><body><h1>{title}</h1>\
         <p>{message}</p><p>You can close this window now.</p></body></html>"
    ))
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
