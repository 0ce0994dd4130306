//! `kamatera_datacenter` data source

use crate::client::{self, ApiTransport};
use crate::dto::DatacenterRecord;
use crate::error::{KamateraError, Result};
use async_trait::async_trait;
use serde_json::json;
use skyform_cloud::{DataSource, ResourceData};
use std::sync::Arc;

pub const DATACENTER_DATA_SOURCE: &str = "kamatera_datacenter";

/// All datacenters available to the account
pub async fn list_datacenters(api: &dyn ApiTransport) -> Result<Vec<DatacenterRecord>> {
    let value = client::get(api, "service/server?datacenter=1").await?;
    client::decode(value, "datacenter list")
}

/// Datacenter matching every non-empty criterion, if exactly one does
pub fn select_datacenter<'a>(
    datacenters: &'a [DatacenterRecord],
    id: &str,
    country: &str,
    name: &str,
) -> Option<&'a DatacenterRecord> {
    if id.is_empty() && country.is_empty() && name.is_empty() {
        return None;
    }

    let mut matches = datacenters.iter().filter(|dc| {
        (id.is_empty() || dc.id == id)
            && (country.is_empty() || dc.country == country)
            && (name.is_empty() || dc.city == name)
    });

    match (matches.next(), matches.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

/// Table of datacenters for error messages and the CLI
pub fn datacenter_table(datacenters: &[DatacenterRecord]) -> String {
    let mut lines = vec![format!("{:<8} {:<15} {:<15}", "id", "country", "name")];
    lines.extend(datacenters.iter().map(|dc| {
        format!(
            "{:<8} {:<15} {:<15}",
            format!("\"{}\"", dc.id),
            format!("\"{}\"", dc.country),
            format!("\"{}\"", dc.city)
        )
    }));
    lines.join("\n")
}

pub struct DatacenterDataSource {
    api: Arc<dyn ApiTransport>,
}

impl DatacenterDataSource {
    pub fn new(api: Arc<dyn ApiTransport>) -> Self {
        Self { api }
    }

    async fn read_datacenter(&self, data: &mut dyn ResourceData) -> Result<()> {
        let datacenters = match list_datacenters(self.api.as_ref()).await {
            Ok(datacenters) => datacenters,
            Err(e) => {
                data.set_id(String::new());
                return Err(e);
            }
        };

        let id = data.get_string("id");
        let country = data.get_string("country");
        let name = data.get_string("name");

        match select_datacenter(&datacenters, &id, &country, &name) {
            Some(dc) => {
                tracing::debug!("Selected datacenter {}", dc.id);
                data.set_id(dc.id.clone());
                data.set("id", json!(dc.id));
                data.set("name", json!(dc.city));
                data.set("country", json!(dc.country));
                Ok(())
            }
            None => {
                data.set_id(String::new());
                data.set("name", json!(""));
                data.set("country", json!(""));
                Err(KamateraError::InvalidConfig(format!(
                    "could not find matching datacenter, available datacenters: \n{}",
                    datacenter_table(&datacenters)
                )))
            }
        }
    }
}

#[async_trait]
impl DataSource for DatacenterDataSource {
    fn type_name(&self) -> &str {
        DATACENTER_DATA_SOURCE
    }

    async fn read(&self, data: &mut dyn ResourceData) -> skyform_cloud::Result<()> {
        Ok(self.read_datacenter(data).await?)
    }
}
