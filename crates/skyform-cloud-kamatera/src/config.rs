//! Provider session configuration

use crate::error::{KamateraError, Result};
use std::fmt;

pub const DEFAULT_API_URL: &str = "https://cloudcli.cloudwm.com";

pub const ENV_API_CLIENT_ID: &str = "KAMATERA_API_CLIENT_ID";
pub const ENV_API_SECRET: &str = "KAMATERA_API_SECRET";
pub const ENV_API_URL: &str = "KAMATERA_API_URL";

/// Immutable session settings shared by every API call of a run
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    api_url: String,
    api_client_id: String,
    api_secret: String,
}

impl ProviderConfig {
    pub fn new(
        api_url: impl Into<String>,
        api_client_id: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Result<Self> {
        let api_client_id = api_client_id.into();
        let api_secret = api_secret.into();
        if api_client_id.trim().is_empty() {
            return Err(KamateraError::MissingCredential("api_client_id"));
        }
        if api_secret.trim().is_empty() {
            return Err(KamateraError::MissingCredential("api_secret"));
        }

        let api_url = api_url.into();
        let api_url = if api_url.trim().is_empty() {
            DEFAULT_API_URL.to_string()
        } else {
            api_url.trim_end_matches('/').to_string()
        };

        Ok(Self {
            api_url,
            api_client_id,
            api_secret,
        })
    }

    /// Create ProviderConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let api_client_id = std::env::var(ENV_API_CLIENT_ID)
            .map_err(|_| KamateraError::MissingCredential(ENV_API_CLIENT_ID))?;
        let api_secret = std::env::var(ENV_API_SECRET)
            .map_err(|_| KamateraError::MissingCredential(ENV_API_SECRET))?;
        let api_url = std::env::var(ENV_API_URL).unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        Self::new(api_url, api_client_id, api_secret)
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn api_client_id(&self) -> &str {
        &self.api_client_id
    }

    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    /// Full URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }
}

// Keep the secret out of logs
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_url", &self.api_url)
            .field("api_client_id", &self.api_client_id)
            .field("api_secret", &"***")
            .finish()
    }
}
