//! # oauth-flow
//!
//! OAuth 2.0 authorization-code flow for command-line and agent tools.
//! Opens the provider's consent page, receives the redirect on a short-lived
//! local listener, exchanges the code and caches the token on disk.

mod error;
mod token;
mod config;
mod callback;
mod browser;
mod flow;

pub use error::{OAuthError, Result};
pub use token::{FileTokenStore, Token, TokenKey, TokenStore};
pub use config::{OAuthClientConfig, DEFAULT_AUTHORIZATION_TIMEOUT, DEFAULT_REDIRECT_URI};
pub use callback::{CallbackListener, CallbackOutcome};
pub use browser::{BrowserLauncher, SystemBrowser};
pub use flow::OAuthFlowEngine;
