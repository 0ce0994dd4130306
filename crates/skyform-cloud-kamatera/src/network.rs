//! `kamatera_server_network` resource
//!
//! A private network (VLAN) in one datacenter with one or more subnets.
//! Subnets carry no stable identity in configuration, so they are matched by
//! description, which therefore has to be unique within a network.

use crate::client::{self, ApiTransport};
use crate::dto::{
    CreateNetworkRequest, CreateSubnetRequest, CreatedNetwork, DeleteNetworkRequest,
    DeleteSubnetRequest, EditSubnetRequest, NetworkRecord, ResEnvelope, SubnetRecord,
};
use crate::error::{KamateraError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use skyform_cloud::{CloudError, Resource, ResourceData};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const NETWORK_RESOURCE: &str = "kamatera_server_network";

/// One subnet as stored in the `subnet` attribute
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub ip: String,
    pub bit: i64,
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub dns1: String,
    #[serde(default)]
    pub dns2: String,
    #[serde(default)]
    pub description: String,
    /// Assigned by the API
    #[serde(default)]
    pub id: i64,
}

impl Subnet {
    /// Same addressing, ignoring description and id
    fn differs_from(&self, other: &Subnet) -> bool {
        self.ip != other.ip
            || self.bit != other.bit
            || self.gateway != other.gateway
            || self.dns1 != other.dns1
            || self.dns2 != other.dns2
    }
}

impl From<SubnetRecord> for Subnet {
    fn from(record: SubnetRecord) -> Self {
        Self {
            ip: record.subnet_ip,
            bit: record.subnet_bit,
            gateway: record.gateway,
            dns1: record.dns1,
            dns2: record.dns2,
            description: record.subnet_description,
            id: record.subnet_id,
        }
    }
}

fn subnets(value: Option<&Value>) -> Result<Vec<Subnet>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| KamateraError::InvalidConfig(format!("invalid subnet: {}", e))),
    }
}

fn by_description(subnets: &[Subnet]) -> Option<HashMap<&str, &Subnet>> {
    let map: HashMap<&str, &Subnet> = subnets
        .iter()
        .map(|s| (s.description.as_str(), s))
        .collect();
    (map.len() == subnets.len()).then_some(map)
}

/// Network lifecycle handler
pub struct NetworkResource {
    api: Arc<dyn ApiTransport>,
}

impl NetworkResource {
    pub fn new(api: Arc<dyn ApiTransport>) -> Self {
        Self { api }
    }

    async fn add_subnet(&self, datacenter: &str, vlan_id: &str, subnet: &Subnet) -> Result<i64> {
        tracing::info!("Adding subnet {} to network {}", subnet.description, vlan_id);
        let body = CreateSubnetRequest {
            datacenter: datacenter.to_string(),
            vlan_id: vlan_id.to_string(),
            subnet_ip: subnet.ip.clone(),
            subnet_bit: subnet.bit,
            gateway: subnet.gateway.clone(),
            dns1: subnet.dns1.clone(),
            dns2: subnet.dns2.clone(),
            subnet_description: subnet.description.clone(),
        };
        let value = client::post(self.api.as_ref(), "service/network/subnet/create", &body).await?;
        Ok(created(value)?.subnet_id)
    }

    async fn edit_subnet(&self, datacenter: &str, vlan_id: &str, subnet: &Subnet) -> Result<()> {
        tracing::info!("Editing subnet {} of network {}", subnet.id, vlan_id);
        let body = EditSubnetRequest {
            datacenter: datacenter.to_string(),
            vlan_id: vlan_id.to_string(),
            subnet_id: subnet.id,
            subnet_ip: subnet.ip.clone(),
            subnet_bit: subnet.bit,
            gateway: subnet.gateway.clone(),
            dns1: subnet.dns1.clone(),
            dns2: subnet.dns2.clone(),
            subnet_description: subnet.description.clone(),
        };
        client::post(self.api.as_ref(), "service/network/subnet/edit", &body).await?;
        Ok(())
    }

    async fn delete_subnet(&self, subnet: &Subnet) -> Result<()> {
        tracing::info!("Deleting subnet {}", subnet.id);
        let body = DeleteSubnetRequest { subnet_id: subnet.id };
        client::post(self.api.as_ref(), "service/network/subnet/delete", &body).await?;
        Ok(())
    }

    async fn create_network(&self, data: &mut dyn ResourceData) -> Result<()> {
        let mut subnets = subnets(data.get("subnet"))?;
        if subnets.is_empty() {
            return Err(KamateraError::InvalidConfig(
                "when creating a new network, at least 1 subnet is required".into(),
            ));
        }
        if by_description(&subnets).is_none() {
            return Err(KamateraError::InvalidConfig(
                "each subnet must have a unique description".into(),
            ));
        }

        let datacenter = data.get_string("datacenter_id");
        let first = &subnets[0];
        let body = CreateNetworkRequest {
            datacenter: datacenter.clone(),
            name: data.get_string("name"),
            subnet_ip: first.ip.clone(),
            subnet_bit: first.bit,
            gateway: first.gateway.clone(),
            dns1: first.dns1.clone(),
            dns2: first.dns2.clone(),
            subnet_description: first.description.clone(),
        };

        tracing::info!("Creating network {} in {}", body.name, datacenter);
        let value = client::post(self.api.as_ref(), "service/network/create", &body).await?;
        let network = created(value)?;
        let vlan_id = network.network_id.to_string();
        data.set_id(vlan_id.clone());
        subnets[0].id = network.subnet_id;

        for subnet in subnets.iter_mut().skip(1) {
            subnet.id = self.add_subnet(&datacenter, &vlan_id, subnet).await?;
        }
        data.set("subnet", serde_json::to_value(&subnets)?);

        self.read_network(data).await
    }

    async fn read_network(&self, data: &mut dyn ResourceData) -> Result<()> {
        let datacenter = data.get_string("datacenter_id");
        let vlan_id = data.id().to_string();

        let value = client::get(
            self.api.as_ref(),
            &format!("service/networks?datacenter={}", datacenter),
        )
        .await?;
        let networks: Vec<NetworkRecord> = client::decode(value, "network list")?;
        let network = networks
            .into_iter()
            .find(|n| n.vlan_id.to_string() == vlan_id)
            .ok_or_else(|| KamateraError::NetworkNotFound {
                id: vlan_id.clone(),
                datacenter: datacenter.clone(),
            })?;

        let network_id = match network.ids.as_slice() {
            [id] => network_id(id)?,
            _ => return Err(KamateraError::malformed("invalid ids returned from network list")),
        };
        let full_name = match network.names.as_slice() {
            [name] => name.clone(),
            _ => return Err(KamateraError::malformed("invalid names returned from network list")),
        };

        data.set("network_id", json!(network_id));
        if data.get_str("name").is_none_or(str::is_empty) {
            data.set("name", json!(short_name(&full_name)));
        }
        data.set("full_name", json!(full_name));

        let value = client::get(
            self.api.as_ref(),
            &format!(
                "service/network/subnets?datacenter={}&vlanId={}",
                datacenter, vlan_id
            ),
        )
        .await?;
        let records: Vec<SubnetRecord> = client::decode(value, "subnet list")?;
        let subnets: Vec<Subnet> = records.into_iter().map(Subnet::from).collect();
        if by_description(&subnets).is_none() {
            return Err(KamateraError::malformed(
                "cannot differentiate between subnets based on subnet descriptions",
            ));
        }
        data.set("subnet", serde_json::to_value(&subnets)?);

        Ok(())
    }

    async fn update_network(&self, data: &mut dyn ResourceData) -> Result<()> {
        if data.has_change("name") {
            return Err(KamateraError::InvalidConfig(
                "changing network name is not supported".into(),
            ));
        }
        if data.has_change("datacenter_id") {
            return Err(KamateraError::InvalidConfig(
                "changing network datacenter is not supported".into(),
            ));
        }

        if data.has_change("subnet") {
            let (prior, desired) = data.get_change("subnet");
            let prior = subnets(prior)?;
            let mut desired = subnets(desired)?;
            let datacenter = data.get_string("datacenter_id");
            let vlan_id = data.id().to_string();

            let prior_by_description = by_description(&prior);
            let desired_descriptions: Option<HashSet<String>> = by_description(&desired)
                .map(|m| m.keys().map(|d| d.to_string()).collect());
            let (Some(prior_by_description), Some(desired_descriptions)) =
                (prior_by_description, desired_descriptions)
            else {
                return Err(KamateraError::InvalidConfig(
                    "cannot identify unique subnets based on descriptions".into(),
                ));
            };

            for subnet in desired.iter_mut() {
                match prior_by_description.get(subnet.description.as_str()) {
                    Some(old) => {
                        if subnet.id == 0 {
                            subnet.id = old.id;
                        }
                        if old.differs_from(subnet) {
                            self.edit_subnet(&datacenter, &vlan_id, subnet).await?;
                        }
                    }
                    None => {
                        subnet.id = self.add_subnet(&datacenter, &vlan_id, subnet).await?;
                    }
                }
            }

            for old in &prior {
                if !desired_descriptions.contains(&old.description) {
                    self.delete_subnet(old).await?;
                }
            }

            data.set("subnet", serde_json::to_value(&desired)?);
        }

        self.read_network(data).await
    }

    async fn delete_network(&self, data: &mut dyn ResourceData) -> Result<()> {
        for subnet in subnets(data.get("subnet"))? {
            self.delete_subnet(&subnet).await?;
        }

        let body = DeleteNetworkRequest {
            datacenter: data.get_string("datacenter_id"),
            id: data.get_i64("network_id").unwrap_or_default(),
        };
        tracing::info!("Deleting network {} in {}", body.id, body.datacenter);
        client::post(self.api.as_ref(), "service/network/delete", &body).await?;

        data.mark_deleted();
        Ok(())
    }

    async fn import_network(&self, data: &mut dyn ResourceData) -> Result<()> {
        let import_id = data.id().to_string();
        let (datacenter, vlan_id) = import_id
            .split_once(':')
            .filter(|(dc, vlan)| !dc.is_empty() && !vlan.is_empty())
            .ok_or_else(|| {
                CloudError::InvalidImportId(format!(
                    "{} (expected <datacenter>:<vlanId>)",
                    import_id
                ))
            })?;

        data.set("datacenter_id", json!(datacenter));
        data.set_id(vlan_id.to_string());
        self.read_network(data).await
    }
}

/// Decode the `res` JSON string of a creation response
fn created(value: Value) -> Result<CreatedNetwork> {
    let envelope: ResEnvelope = client::decode(value, "network create")?;
    serde_json::from_str(&envelope.res)
        .map_err(|e| KamateraError::malformed(format!("invalid network create result: {}", e)))
}

fn network_id(value: &Value) -> Result<i64> {
    let id = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    id.ok_or_else(|| KamateraError::malformed(format!("invalid network id {}", value)))
}

/// `lan-<n>-<name>` -> `<name>`
fn short_name(full_name: &str) -> String {
    full_name.split('-').skip(2).collect::<Vec<_>>().join("-")
}

#[async_trait]
impl Resource for NetworkResource {
    fn type_name(&self) -> &str {
        NETWORK_RESOURCE
    }

    async fn create(&self, data: &mut dyn ResourceData) -> skyform_cloud::Result<()> {
        Ok(self.create_network(data).await?)
    }

    async fn read(&self, data: &mut dyn ResourceData) -> skyform_cloud::Result<()> {
        Ok(self.read_network(data).await?)
    }

    async fn update(&self, data: &mut dyn ResourceData) -> skyform_cloud::Result<()> {
        Ok(self.update_network(data).await?)
    }

    async fn delete(&self, data: &mut dyn ResourceData) -> skyform_cloud::Result<()> {
        Ok(self.delete_network(data).await?)
    }

    async fn import(&self, data: &mut dyn ResourceData) -> skyform_cloud::Result<()> {
        Ok(self.import_network(data).await?)
    }
}
