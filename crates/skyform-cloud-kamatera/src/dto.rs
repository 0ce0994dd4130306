//! Request payloads and response records of the Kamatera API
//!
//! Field names follow the wire format exactly. Responses are decoded
//! leniently: strings that sometimes arrive as numbers (and the reverse) are
//! normalized here so the drivers only ever see one type.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Server requests
// ---------------------------------------------------------------------------

/// Body of `POST service/server/info`; one of the two fields is empty
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServerInfoRequest {
    pub id: String,
    pub name: String,
}

impl ServerInfoRequest {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
        }
    }
}

/// Body of `POST service/server`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateServerRequest {
    pub name: String,
    pub password: String,
    #[serde(rename = "passwordValidate")]
    pub password_validate: String,
    #[serde(rename = "ssh-key")]
    pub ssh_key: String,
    pub datacenter: String,
    pub image: String,
    pub cpu: String,
    pub ram: i64,
    /// Space-separated `size=<gb>` entries
    pub disk: String,
    #[serde(rename = "dailybackup")]
    pub daily_backup: String,
    pub managed: String,
    /// Space-separated `name=<net>,ip=<ip>` entries
    pub network: String,
    pub quantity: String,
    #[serde(rename = "billingcycle")]
    pub billing_cycle: String,
    #[serde(rename = "monthlypackage")]
    pub monthly_package: String,
    #[serde(rename = "poweronaftercreate")]
    pub power_on: String,
    #[serde(rename = "script-file")]
    pub script_file: String,
}

/// Body of `POST server/configure`; only the fields being changed are sent
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigureServerRequest {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram: Option<i64>,
    #[serde(rename = "dailybackup", skip_serializing_if = "Option::is_none")]
    pub daily_backup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub managed: Option<String>,
    #[serde(rename = "billingcycle", skip_serializing_if = "Option::is_none")]
    pub billing_cycle: Option<String>,
    #[serde(rename = "monthlypackage", skip_serializing_if = "Option::is_none")]
    pub monthly_package: Option<String>,
}

impl ConfigureServerRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Body of `POST service/server/{poweron,poweroff,terminate}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerRequest {
    pub id: String,
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangePasswordRequest {
    pub id: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenameServerRequest {
    pub id: String,
    #[serde(rename = "new-name")]
    pub new_name: String,
}

// ---------------------------------------------------------------------------
// Server responses
// ---------------------------------------------------------------------------

/// Response of `POST service/server`
///
/// With an auto-generated password the API wraps the command ids together
/// with the password; otherwise it returns the bare id list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CreateServerResponse {
    Generated {
        password: String,
        #[serde(rename = "commandIds")]
        command_ids: Vec<Value>,
    },
    Commands(Vec<Value>),
}

impl CreateServerResponse {
    pub fn generated_password(&self) -> Option<&str> {
        match self {
            CreateServerResponse::Generated { password, .. } => Some(password),
            CreateServerResponse::Commands(_) => None,
        }
    }

    pub fn into_command_ids(self) -> Value {
        match self {
            CreateServerResponse::Generated { command_ids, .. } => Value::Array(command_ids),
            CreateServerResponse::Commands(ids) => Value::Array(ids),
        }
    }
}

/// One entry of `service/server/info`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    /// Hex core count followed by the CPU type letter, e.g. `2B`
    #[serde(default, deserialize_with = "lenient_string")]
    pub cpu: String,
    #[serde(default)]
    pub disk_sizes: Vec<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub power: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub datacenter: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub ram: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub backup: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub managed: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub billing: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub traffic: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub price_monthly_on: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub price_hourly_on: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub price_hourly_off: String,
    #[serde(default)]
    pub networks: Vec<AttachedNetwork>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachedNetwork {
    #[serde(default, deserialize_with = "lenient_string")]
    pub network: String,
    #[serde(default)]
    pub ips: Vec<String>,
}

impl AttachedNetwork {
    pub fn is_public(&self) -> bool {
        self.network.starts_with("wan-")
    }
}

// ---------------------------------------------------------------------------
// Network requests and responses
// ---------------------------------------------------------------------------

/// Body of `POST service/network/create` (network plus its first subnet)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNetworkRequest {
    pub datacenter: String,
    pub name: String,
    pub subnet_ip: String,
    pub subnet_bit: i64,
    pub gateway: String,
    pub dns1: String,
    pub dns2: String,
    pub subnet_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteNetworkRequest {
    pub datacenter: String,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubnetRequest {
    pub datacenter: String,
    pub vlan_id: String,
    pub subnet_ip: String,
    pub subnet_bit: i64,
    pub gateway: String,
    pub dns1: String,
    pub dns2: String,
    pub subnet_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditSubnetRequest {
    pub datacenter: String,
    pub vlan_id: String,
    pub subnet_id: i64,
    pub subnet_ip: String,
    pub subnet_bit: i64,
    pub gateway: String,
    pub dns1: String,
    pub dns2: String,
    pub subnet_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSubnetRequest {
    pub subnet_id: i64,
}

/// Envelope of network/subnet creation; `res` is itself JSON text
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResEnvelope {
    pub res: String,
}

/// Decoded content of [`ResEnvelope::res`]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedNetwork {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub network_id: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub subnet_id: i64,
}

/// One entry of `service/networks`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRecord {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub vlan_id: i64,
    #[serde(default)]
    pub ids: Vec<Value>,
    #[serde(default)]
    pub names: Vec<String>,
}

/// One entry of `service/network/subnets`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetRecord {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub subnet_id: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub subnet_ip: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub subnet_bit: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub gateway: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub dns1: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub dns2: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub subnet_description: String,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// One entry of `service/server?datacenter=1`
///
/// The API calls the country `name` and the city `subCategory`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatacenterRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, rename = "subCategory", deserialize_with = "lenient_string")]
    pub city: String,
    #[serde(default, rename = "name", deserialize_with = "lenient_string")]
    pub country: String,
}

/// One entry of `service/server?images=1&datacenter=<id>`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImageRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub os: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
}

// ---------------------------------------------------------------------------
// Lenient field decoding
// ---------------------------------------------------------------------------

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| D::Error::custom(format!("invalid integer {}", n))),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(|f| f as i64)
            .map_err(|_| D::Error::custom(format!("invalid integer {:?}", s))),
        other => Err(D::Error::custom(format!("invalid integer {}", other))),
    }
}

/// Render a JSON scalar the way the API expects it in an id slot
pub fn value_to_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}
