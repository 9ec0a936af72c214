//! Opening the authorization URL for the user

use crate::error::{OAuthError, Result};

/// Something that can present an authorization URL to the user
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> Result<()>;
}

/// The platform's default browser
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        open::that(url).map_err(|e| OAuthError::Browser(e.to_string()))
    }
}
