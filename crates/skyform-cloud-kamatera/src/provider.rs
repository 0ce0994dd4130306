//! Kamatera provider implementation

use crate::client::{ApiClient, ApiTransport};
use crate::command::{CommandWaiter, WaitConfig};
use crate::config::ProviderConfig;
use crate::datacenter::{DatacenterDataSource, list_datacenters};
use crate::error::Result;
use crate::image::ImageDataSource;
use crate::network::NetworkResource;
use crate::server::ServerResource;
use crate::server_options::ServerOptionsCache;
use async_trait::async_trait;
use skyform_cloud::{AuthStatus, DataSource, Provider, Resource};
use std::sync::Arc;

/// Kamatera provider
///
/// Owns the API session, the command wait settings and the server options
/// cache shared by every resource it hands out.
pub struct KamateraProvider {
    api: Arc<dyn ApiTransport>,
    wait: WaitConfig,
    options: Arc<ServerOptionsCache>,
}

impl KamateraProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self::with_transport(Arc::new(ApiClient::new(config)))
    }

    /// Create from `KAMATERA_API_*` environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(ProviderConfig::from_env()?))
    }

    pub fn with_transport(api: Arc<dyn ApiTransport>) -> Self {
        Self {
            api,
            wait: WaitConfig::default(),
            options: Arc::new(ServerOptionsCache::new()),
        }
    }

    pub fn with_wait_config(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_server_options(mut self, options: Arc<ServerOptionsCache>) -> Self {
        self.options = options;
        self
    }

    pub fn api(&self) -> &dyn ApiTransport {
        self.api.as_ref()
    }

    pub fn waiter(&self) -> CommandWaiter<'_> {
        CommandWaiter::with_config(self.api.as_ref(), self.wait)
    }

    pub fn server_options(&self) -> &ServerOptionsCache {
        &self.options
    }

    pub fn server_resource(&self) -> ServerResource {
        ServerResource::new(self.api.clone(), self.wait, self.options.clone())
    }
}

#[async_trait]
impl Provider for KamateraProvider {
    fn name(&self) -> &str {
        "kamatera"
    }

    async fn check_auth(&self) -> skyform_cloud::Result<AuthStatus> {
        match list_datacenters(self.api.as_ref()).await {
            Ok(datacenters) => Ok(AuthStatus::ok(format!(
                "{} datacenters available",
                datacenters.len()
            ))),
            Err(e) if e.is_unauthorized() => Ok(AuthStatus::failed(format!(
                "credentials rejected by Kamatera API: {}",
                e
            ))),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    fn resources(&self) -> Vec<Arc<dyn Resource>> {
        vec![
            Arc::new(self.server_resource()),
            Arc::new(NetworkResource::new(self.api.clone())),
        ]
    }

    fn data_sources(&self) -> Vec<Arc<dyn DataSource>> {
        vec![
            Arc::new(DatacenterDataSource::new(self.api.clone())),
            Arc::new(ImageDataSource::new(self.api.clone())),
        ]
    }
}
