//! Kamatera cloudcli API client
//!
//! Every call carries the `AuthClientId` / `AuthSecret` header pair; there is
//! no session or token. Responses are JSON whatever the status code, so the
//! body is decoded first and the status checked second.

use crate::config::ProviderConfig;
use crate::error::{KamateraError, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use reqwest::Method;

/// Transport seam between the drivers and the remote control plane
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Issue one request and return the decoded JSON body of a 200 response
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value>;
}

/// HTTP client for the Kamatera API
pub struct ApiClient {
    http: reqwest::Client,
    config: ProviderConfig,
}

impl ApiClient {
    pub fn new(config: ProviderConfig) -> Self {
        Self::with_http_client(config, reqwest::Client::new())
    }

    pub fn with_http_client(config: ProviderConfig, http: reqwest::Client) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

#[async_trait]
impl ApiTransport for ApiClient {
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = self.config.url(path);
        tracing::debug!("Kamatera API {} {}", method, url);

        let mut builder = self
            .http
            .request(method, &url)
            .header("AuthClientId", self.config.api_client_id())
            .header("AuthSecret", self.config.api_secret())
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");

        if let Some(body) = body {
            builder = builder.body(serde_json::to_vec(&body)?);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        decode_response(status, &text)
    }
}

/// Turn a raw status/body pair into the decoded value or a typed error
pub(crate) fn decode_response(status: u16, body: &str) -> Result<Value> {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) if status != 200 => {
            return Err(KamateraError::BadResponse(format!("status code {}", status)));
        }
        Err(_) => {
            return Err(KamateraError::BadResponse(format!("malformed body: {}", body)));
        }
    };

    if status != 200 {
        let message = match value.get("message") {
            Some(Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
            None => value.to_string(),
        };
        return Err(KamateraError::Api { status, message });
    }

    Ok(value)
}

/// POST a typed payload
pub async fn post<T>(api: &dyn ApiTransport, path: &str, body: &T) -> Result<Value>
where
    T: Serialize + Sync + ?Sized,
{
    let body = serde_json::to_value(body)?;
    api.request(Method::POST, path, Some(body)).await
}

/// GET without a body
pub async fn get(api: &dyn ApiTransport, path: &str) -> Result<Value> {
    api.request(Method::GET, path, None).await
}

/// Decode a response value into an endpoint record
///
/// A shape mismatch is a structural error, not a panic.
pub fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| KamateraError::malformed(format!("unexpected {} response: {}", what, e)))
}
