//! Kamatera provider error types

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KamateraError {
    #[error("missing Kamatera credential: {0}")]
    MissingCredential(&'static str),

    #[error("failed to reach Kamatera API: {0}")]
    Network(#[from] reqwest::Error),

    /// Body was not JSON; carries the status code when non-200, else the body
    #[error("bad response from Kamatera API: {0}")]
    BadResponse(String),

    #[error("error response from Kamatera API ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("kamatera command failed: {0}")]
    CommandFailed(String),

    #[error("timeout waiting for Kamatera command {command_id} to complete after {waited:?}")]
    Timeout { command_id: String, waited: Duration },

    #[error("invalid response from Kamatera API: {0}")]
    MalformedResponse(String),

    #[error("can not parse disk value, old: {prior}, new: {desired}")]
    UnparseableDiskValues {
        prior: serde_json::Value,
        desired: serde_json::Value,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("changing server {0} requires recreation, set allow_recreate to true to allow this change")]
    RecreateRequired(&'static str),

    #[error("failed to find server: {0}")]
    ServerNotFound(String),

    #[error("did not find network {id} in datacenter {datacenter}")]
    NetworkNotFound { id: String, datacenter: String },

    #[error("failed to load server options: {0}")]
    ServerOptions(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cloud error: {0}")]
    Cloud(#[from] skyform_cloud::CloudError),
}

impl KamateraError {
    pub fn malformed(message: impl Into<String>) -> Self {
        KamateraError::MalformedResponse(message.into())
    }

    /// API rejected the credentials
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, KamateraError::Api { status: 401 | 403, .. })
    }
}

impl From<KamateraError> for skyform_cloud::CloudError {
    fn from(error: KamateraError) -> Self {
        match error {
            KamateraError::Cloud(inner) => inner,
            other => skyform_cloud::CloudError::provider(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, KamateraError>;
