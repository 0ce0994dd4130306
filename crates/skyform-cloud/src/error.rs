//! Host contract error types

use thiserror::Error;

/// Errors surfaced to the host engine by lifecycle entry points
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource type not found: {0}")]
    ResourceTypeNotFound(String),

    #[error("Data source not found: {0}")]
    DataSourceNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Invalid attribute {attribute}: {reason}")]
    InvalidAttribute { attribute: String, reason: String },

    #[error("Invalid import id: {0}")]
    InvalidImportId(String),

    /// Provider failure, message preserved verbatim
    #[error(transparent)]
    Provider(Box<dyn std::error::Error + Send + Sync>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn provider<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CloudError::Provider(Box::new(error))
    }

    pub fn invalid_attribute(attribute: impl Into<String>, reason: impl Into<String>) -> Self {
        CloudError::InvalidAttribute {
            attribute: attribute.into(),
            reason: reason.into(),
        }
    }

    /// Downcast a provider failure back to its concrete type
    pub fn provider_error<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            CloudError::Provider(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
