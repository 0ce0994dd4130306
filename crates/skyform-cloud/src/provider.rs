//! Provider, resource and data source traits

use crate::data::ResourceData;
use crate::error::{CloudError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cloud provider abstraction trait
///
/// A provider bundles the resource types and data sources it can manage
/// behind one authenticated session.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Returns the provider name (e.g., "kamatera")
    fn name(&self) -> &str;

    /// Check that the configured credentials are accepted by the remote API
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Managed resource types
    fn resources(&self) -> Vec<Arc<dyn Resource>>;

    /// Read-only data sources
    fn data_sources(&self) -> Vec<Arc<dyn DataSource>>;

    /// Look up a resource type by name (e.g., "kamatera_server")
    fn resource(&self, type_name: &str) -> Result<Arc<dyn Resource>> {
        self.resources()
            .into_iter()
            .find(|r| r.type_name() == type_name)
            .ok_or_else(|| CloudError::ResourceTypeNotFound(type_name.to_string()))
    }

    /// Look up a data source by name (e.g., "kamatera_image")
    fn data_source(&self, type_name: &str) -> Result<Arc<dyn DataSource>> {
        self.data_sources()
            .into_iter()
            .find(|d| d.type_name() == type_name)
            .ok_or_else(|| CloudError::DataSourceNotFound(type_name.to_string()))
    }
}

/// Lifecycle handler for one resource type
///
/// The host calls `create` for new instances, `read` to refresh observed
/// state, `update` with prior and desired values loaded into the data, and
/// `delete` to destroy. Every call runs to completion before the host moves
/// on; no two calls for the same instance are expected to overlap.
#[async_trait]
pub trait Resource: Send + Sync {
    fn type_name(&self) -> &str;

    /// Validate desired values before any remote call is made
    async fn validate(&self, _data: &dyn ResourceData) -> Result<()> {
        Ok(())
    }

    async fn create(&self, data: &mut dyn ResourceData) -> Result<()>;

    async fn read(&self, data: &mut dyn ResourceData) -> Result<()>;

    async fn update(&self, data: &mut dyn ResourceData) -> Result<()>;

    async fn delete(&self, data: &mut dyn ResourceData) -> Result<()>;

    /// Adopt an existing remote object; `data.id()` holds the import id
    async fn import(&self, data: &mut dyn ResourceData) -> Result<()> {
        self.read(data).await
    }
}

/// Read-only lookup exposed to configurations
#[async_trait]
pub trait DataSource: Send + Sync {
    fn type_name(&self) -> &str;

    async fn read(&self, data: &mut dyn ResourceData) -> Result<()>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}
