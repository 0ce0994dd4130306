//! `kamatera_server` resource
//!
//! Maps server attributes onto `service/server*` and `server/configure`
//! calls. Every mutation is awaited through the command waiter before the
//! next one is issued.

use crate::client::{self, ApiTransport};
use crate::command::{CommandRecord, CommandWaiter, WaitConfig, single_command_id};
use crate::disk::{apply_disk_operations, compute_disk_diff};
use crate::dto::{
    AttachedNetwork, ChangePasswordRequest, ConfigureServerRequest, CreateServerRequest,
    CreateServerResponse, PowerRequest, RenameServerRequest, ServerInfoRequest, ServerRecord,
};
use crate::error::{KamateraError, Result};
use crate::server_options::{ServerOptions, ServerOptionsCache};
use async_trait::async_trait;
use serde_json::{Value, json};
use skyform_cloud::{Resource, ResourceData};
use std::fmt;
use std::sync::Arc;

pub const SERVER_RESOURCE: &str = "kamatera_server";

/// Password placeholder asking the API to generate one
pub const GENERATE_PASSWORD: &str = "__generate__";

const CPU_TYPES: [&str; 4] = ["A", "B", "T", "D"];

/// Attributes that can only change by recreating the server, with the label
/// used in the error
const RECREATE_ATTRIBUTES: [(&str, &str); 5] = [
    ("image_id", "image"),
    ("network", "networks"),
    ("ssh_pubkey", "ssh_pubkey"),
    ("startup_script", "startup_script"),
    ("datacenter_id", "datacenter"),
];

/// Network interface to attach at creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerNetwork {
    pub name: String,
    pub ip: String,
}

impl Default for ServerNetwork {
    fn default() -> Self {
        Self {
            name: "wan".to_string(),
            ip: "auto".to_string(),
        }
    }
}

/// Desired server attributes with defaults applied
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSpec {
    pub name: String,
    pub datacenter_id: String,
    pub image_id: String,
    pub cpu_type: String,
    pub cpu_cores: i64,
    pub ram_mb: i64,
    pub disk_sizes_gb: Vec<f64>,
    pub billing_cycle: String,
    pub monthly_traffic_package: String,
    pub power_on: bool,
    pub networks: Vec<ServerNetwork>,
    pub daily_backup: bool,
    pub managed: bool,
    pub password: String,
    pub ssh_pubkey: String,
    pub startup_script: String,
    pub allow_recreate: bool,
}

impl ServerSpec {
    pub fn from_data(data: &dyn ResourceData) -> Result<Self> {
        Ok(Self {
            name: data.get_string("name"),
            datacenter_id: data.get_string("datacenter_id"),
            image_id: data.get_string("image_id"),
            cpu_type: data
                .get_str("cpu_type")
                .filter(|s| !s.is_empty())
                .unwrap_or("B")
                .to_string(),
            cpu_cores: data.get_i64("cpu_cores").unwrap_or(2),
            ram_mb: data.get_i64("ram_mb").unwrap_or(1024),
            disk_sizes_gb: disk_sizes(data.get("disk_sizes_gb"))?,
            billing_cycle: data
                .get_str("billing_cycle")
                .filter(|s| !s.is_empty())
                .unwrap_or("hourly")
                .to_string(),
            monthly_traffic_package: data.get_string("monthly_traffic_package"),
            power_on: data.get_bool("power_on").unwrap_or(true),
            networks: networks(data.get("network"))?,
            daily_backup: data.get_bool("daily_backup").unwrap_or(false),
            managed: data.get_bool("managed").unwrap_or(false),
            password: data.get_string("password"),
            ssh_pubkey: data.get_string("ssh_pubkey"),
            startup_script: data.get_string("startup_script"),
            allow_recreate: data.get_bool("allow_recreate").unwrap_or(false),
        })
    }

    /// CPU as the API writes it: cores followed by type
    pub fn cpu(&self) -> String {
        format!("{}{}", self.cpu_cores, self.cpu_type)
    }

    /// Checks that need no remote data
    pub fn check(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let name_len = self.name.chars().count();
        if !(4..=40).contains(&name_len) {
            errors.push(format!(
                "name must be between 4 and 40 characters, got {}",
                name_len
            ));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            errors.push("name must contain only letters, digits, dashes (-) and dots (.)".into());
        }
        if self.image_id.is_empty() {
            errors.push("image_id is required".into());
        }
        if !CPU_TYPES.contains(&self.cpu_type.as_str()) {
            errors.push(format!("cpu_type must be one of A, B, T, D, got '{}'", self.cpu_type));
        }
        if self.cpu_cores < 1 {
            errors.push(format!("cpu_cores must be at least 1, got {}", self.cpu_cores));
        }
        if self.ram_mb < 256 {
            errors.push(format!("ram_mb must be at least 256, got {}", self.ram_mb));
        }
        if !(1..=4).contains(&self.disk_sizes_gb.len()) {
            errors.push(format!(
                "disk_sizes_gb must have between 1 and 4 items, got {}",
                self.disk_sizes_gb.len()
            ));
        }
        if self.networks.len() > 4 {
            errors.push(format!("at most 4 networks are allowed, got {}", self.networks.len()));
        }

        errors
    }

    fn create_request(&self, password: &str) -> CreateServerRequest {
        let disk = self
            .disk_sizes_gb
            .iter()
            .map(|size| format!("size={}", size))
            .collect::<Vec<_>>()
            .join(" ");
        let network = self
            .networks
            .iter()
            .map(|n| format!("name={},ip={}", n.name, n.ip))
            .collect::<Vec<_>>()
            .join(" ");

        CreateServerRequest {
            name: self.name.clone(),
            password: password.to_string(),
            password_validate: password.to_string(),
            ssh_key: self.ssh_pubkey.clone(),
            datacenter: self.datacenter_id.clone(),
            image: self.image_id.clone(),
            cpu: self.cpu(),
            ram: self.ram_mb,
            disk,
            daily_backup: yes_no(self.daily_backup),
            managed: yes_no(self.managed),
            network,
            quantity: "1".to_string(),
            billing_cycle: self.billing_cycle.clone(),
            monthly_package: self.monthly_traffic_package.clone(),
            power_on: yes_no(self.power_on),
            script_file: self.startup_script.clone(),
        }
    }
}

fn yes_no(flag: bool) -> String {
    let answer = if flag { "yes" } else { "no" };
    answer.to_string()
}

fn disk_sizes(value: Option<&Value>) -> Result<Vec<f64>> {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Ok(vec![10.0]);
    };
    let invalid = || KamateraError::InvalidConfig(format!("invalid disk_sizes_gb: {}", value));

    value
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|size| match size {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
        .collect::<Option<Vec<f64>>>()
        .ok_or_else(invalid)
}

fn networks(value: Option<&Value>) -> Result<Vec<ServerNetwork>> {
    let list = match value {
        None | Some(Value::Null) => return Ok(vec![ServerNetwork::default()]),
        Some(Value::Array(list)) => list,
        Some(other) => {
            return Err(KamateraError::InvalidConfig(format!("invalid network: {}", other)));
        }
    };

    let networks = list
        .iter()
        .map(|entry| {
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    KamateraError::InvalidConfig(format!("network entry without name: {}", entry))
                })?;
            let ip = entry
                .get("ip")
                .and_then(Value::as_str)
                .filter(|ip| !ip.is_empty())
                .unwrap_or("auto");
            Ok(ServerNetwork {
                name: name.to_string(),
                ip: ip.to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if networks.is_empty() {
        Ok(vec![ServerNetwork::default()])
    } else {
        Ok(networks)
    }
}

/// Check a desired server against local rules and the options catalog
///
/// All problems are reported together.
pub fn validate_server(options: &ServerOptions, spec: &ServerSpec) -> Result<()> {
    let mut errors = spec.check();

    let checks = [
        options.validate_datacenter(&spec.datacenter_id),
        options.validate_cpu(&spec.cpu()),
        options.validate_ram_mb(&spec.cpu_type, spec.ram_mb),
    ];
    errors.extend(checks.into_iter().filter_map(|c| c.err()));

    for size in &spec.disk_sizes_gb {
        if let Err(e) = options.validate_disk_size_gb(*size) {
            errors.push(e);
        }
    }

    match spec.billing_cycle.as_str() {
        "monthly" => {
            if let Err(e) = options.validate_monthly_traffic_package(
                &spec.datacenter_id,
                &spec.monthly_traffic_package,
            ) {
                errors.push(e);
            }
        }
        "hourly" => {}
        other => errors.push(format!(
            "billing cycle must be either 'hourly' or 'monthly', got '{}'",
            other
        )),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(KamateraError::InvalidConfig(format!(
            "invalid server configuration: {}",
            errors.join(", ")
        )))
    }
}

/// Power transitions of `service/server/<operation>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOperation {
    On,
    Off,
    Terminate,
}

impl PowerOperation {
    pub fn path(self) -> &'static str {
        match self {
            PowerOperation::On => "service/server/poweron",
            PowerOperation::Off => "service/server/poweroff",
            PowerOperation::Terminate => "service/server/terminate",
        }
    }
}

impl fmt::Display for PowerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerOperation::On => write!(f, "poweron"),
            PowerOperation::Off => write!(f, "poweroff"),
            PowerOperation::Terminate => write!(f, "terminate"),
        }
    }
}

/// Run a power operation and wait for it
pub async fn change_server_power(
    waiter: &CommandWaiter<'_>,
    internal_server_id: &str,
    operation: PowerOperation,
) -> Result<CommandRecord> {
    tracing::info!("Server {}: {}", internal_server_id, operation);
    let body = PowerRequest {
        id: internal_server_id.to_string(),
        force: operation == PowerOperation::Terminate,
    };
    waiter.execute(operation.path(), &body).await
}

/// Fetch exactly one server record
pub async fn server_info(
    api: &dyn ApiTransport,
    request: &ServerInfoRequest,
) -> Result<ServerRecord> {
    let value = client::post(api, "service/server/info", request).await?;
    let mut servers: Vec<ServerRecord> = client::decode(value, "server info")?;
    if servers.len() != 1 {
        let key = if request.id.is_empty() { &request.name } else { &request.id };
        return Err(KamateraError::ServerNotFound(key.clone()));
    }
    Ok(servers.remove(0))
}

/// Split `<hex cores><type>` into (type, cores)
pub fn parse_cpu(cpu: &str) -> Result<(String, i64)> {
    let invalid = || KamateraError::malformed(format!("invalid server cpu: {:?}", cpu));
    let cpu_type = cpu.chars().last().ok_or_else(invalid)?;
    let cores = &cpu[..cpu.len() - cpu_type.len_utf8()];
    let cores = i64::from_str_radix(cores, 16).map_err(|_| invalid())?;
    Ok((cpu_type.to_string(), cores))
}

/// Name announced by a creation log (`Name: <name>` line, last one wins)
pub fn created_server_name(log: &str) -> Option<String> {
    log.lines()
        .filter_map(|line| line.strip_prefix("Name: "))
        .last()
        .map(|name| name.trim_end_matches('\r').to_string())
        .filter(|name| !name.is_empty())
}

/// Write an observed record into the resource attributes
fn apply_record(data: &mut dyn ResourceData, record: ServerRecord) -> Result<()> {
    let (cpu_type, cpu_cores) = parse_cpu(&record.cpu)?;

    // Position is the only disk identity, so one bad entry fails the read
    let disk_sizes = record
        .disk_sizes
        .iter()
        .map(|size| match size {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.parse::<f64>().ok().map(|f| f as i64),
            _ => None,
        })
        .collect::<Option<Vec<i64>>>()
        .ok_or_else(|| {
            KamateraError::malformed(format!(
                "invalid disk size in server record: {:?}",
                record.disk_sizes
            ))
        })?;

    let (public, private): (Vec<&AttachedNetwork>, Vec<&AttachedNetwork>) =
        record.networks.iter().partition(|n| n.is_public());
    let public_ips: Vec<&String> = public.iter().flat_map(|n| &n.ips).collect();
    let private_ips: Vec<&String> = private.iter().flat_map(|n| &n.ips).collect();

    data.set("name", json!(record.name));
    data.set("cpu_type", json!(cpu_type));
    data.set("cpu_cores", json!(cpu_cores));
    data.set("disk_sizes_gb", json!(disk_sizes));
    data.set("power_on", json!(record.power == "on"));
    data.set("datacenter_id", json!(record.datacenter));
    data.set("ram_mb", json!(record.ram));
    data.set("daily_backup", json!(record.backup == "1"));
    data.set("managed", json!(record.managed == "1"));
    data.set("billing_cycle", json!(record.billing));
    data.set("monthly_traffic_package", json!(record.traffic));
    data.set("internal_server_id", json!(record.id));
    data.set("price_monthly_on", json!(record.price_monthly_on));
    data.set("price_hourly_on", json!(record.price_hourly_on));
    data.set("price_hourly_off", json!(record.price_hourly_off));
    data.set("public_ips", json!(public_ips));
    data.set("private_ips", json!(private_ips));
    data.set("attached_networks", serde_json::to_value(&record.networks)?);

    Ok(())
}

/// Server lifecycle handler
pub struct ServerResource {
    api: Arc<dyn ApiTransport>,
    wait: WaitConfig,
    options: Arc<ServerOptionsCache>,
}

impl ServerResource {
    pub fn new(
        api: Arc<dyn ApiTransport>,
        wait: WaitConfig,
        options: Arc<ServerOptionsCache>,
    ) -> Self {
        Self { api, wait, options }
    }

    fn waiter(&self) -> CommandWaiter<'_> {
        CommandWaiter::with_config(self.api.as_ref(), self.wait)
    }

    fn internal_id(data: &dyn ResourceData) -> Result<String> {
        data.get_str("internal_server_id")
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                KamateraError::InvalidConfig(
                    "internal_server_id is not known, read the server first".into(),
                )
            })
    }

    async fn validate_data(&self, data: &dyn ResourceData) -> Result<()> {
        let spec = ServerSpec::from_data(data)?;
        let options = self.options.get().await?;
        validate_server(options, &spec)
    }

    async fn create_server(&self, data: &mut dyn ResourceData) -> Result<()> {
        let spec = ServerSpec::from_data(data)?;
        let password = if spec.password.is_empty() {
            GENERATE_PASSWORD
        } else {
            spec.password.as_str()
        };

        tracing::info!("Creating server {} in {}", spec.name, spec.datacenter_id);
        let request = spec.create_request(password);
        let value = client::post(self.api.as_ref(), "service/server", &request).await?;
        let response: CreateServerResponse = client::decode(value, "create server")?;

        data.set(
            "generated_password",
            json!(response.generated_password().unwrap_or_default()),
        );
        let command_id = single_command_id(response.into_command_ids())?;
        let command = self.waiter().wait(&command_id).await?;

        let log = command
            .log()
            .ok_or_else(|| KamateraError::malformed("command is missing creation log"))?;
        let name = created_server_name(&log)
            .ok_or_else(|| KamateraError::malformed("failed to get created server name"))?;

        tracing::info!("Created server {}", name);
        data.set_id(name);
        self.read_server(data).await
    }

    async fn read_server(&self, data: &mut dyn ResourceData) -> Result<()> {
        let request = match data.get_str("internal_server_id").filter(|id| !id.is_empty()) {
            Some(id) => ServerInfoRequest::by_id(id),
            None => ServerInfoRequest::by_name(data.id()),
        };
        tracing::debug!("Reading server {:?}", request);

        let record = server_info(self.api.as_ref(), &request).await?;
        apply_record(data, record)
    }

    async fn update_server(&self, data: &mut dyn ResourceData) -> Result<()> {
        let spec = ServerSpec::from_data(data)?;

        if !spec.allow_recreate {
            if let Some((_, label)) = RECREATE_ATTRIBUTES
                .iter()
                .find(|(attribute, _)| data.has_change(attribute))
            {
                return Err(KamateraError::RecreateRequired(*label));
            }
        }

        let id = Self::internal_id(data)?;
        let waiter = self.waiter();

        for request in configure_requests(&id, data, &spec) {
            tracing::info!("Configuring server {}: {:?}", id, request);
            waiter.execute("server/configure", &request).await?;
        }

        if data.has_change("disk_sizes_gb") {
            let (prior, desired) = data.get_change("disk_sizes_gb");
            let ops = compute_disk_diff(
                prior.unwrap_or(&Value::Null),
                desired.unwrap_or(&Value::Null),
            )?;
            apply_disk_operations(&waiter, &id, &ops).await?;
        }

        if data.has_change("password") {
            let prior = data.get_change("password").0.cloned().unwrap_or(Value::Null);
            let body = ChangePasswordRequest {
                id: id.clone(),
                password: spec.password.clone(),
            };
            tracing::info!("Changing password of server {}", id);
            if let Err(e) = waiter.execute("service/server/password", &body).await {
                tracing::warn!("Password change failed, keeping previous password: {}", e);
                data.set("password", prior);
                return Err(e);
            }
        }

        if data.has_change("name") {
            let body = RenameServerRequest {
                id: id.clone(),
                new_name: spec.name.clone(),
            };
            tracing::info!("Renaming server {} to {}", id, spec.name);
            waiter.execute("service/server/rename", &body).await?;
        }

        if data.has_change("power_on") {
            let operation = if spec.power_on {
                PowerOperation::On
            } else {
                PowerOperation::Off
            };
            change_server_power(&waiter, &id, operation).await?;
        }

        self.read_server(data).await
    }

    async fn delete_server(&self, data: &mut dyn ResourceData) -> Result<()> {
        let id = Self::internal_id(data)?;
        change_server_power(&self.waiter(), &id, PowerOperation::Terminate).await?;
        data.mark_deleted();
        Ok(())
    }

    async fn import_server(&self, data: &mut dyn ResourceData) -> Result<()> {
        let id = data.id().to_string();
        if id.is_empty() {
            return Err(skyform_cloud::CloudError::InvalidImportId(id).into());
        }
        data.set("internal_server_id", json!(id));
        self.read_server(data).await
    }
}

/// `server/configure` calls for the changed settings, in order: CPU, RAM,
/// billing/traffic, daily backup, managed
fn configure_requests(
    id: &str,
    data: &dyn ResourceData,
    spec: &ServerSpec,
) -> Vec<ConfigureServerRequest> {
    let mut requests = Vec::new();

    if data.has_changes(&["cpu_type", "cpu_cores"]) {
        requests.push(ConfigureServerRequest {
            cpu: Some(spec.cpu()),
            ..ConfigureServerRequest::new(id)
        });
    }

    if data.has_change("ram_mb") {
        requests.push(ConfigureServerRequest {
            ram: Some(spec.ram_mb),
            ..ConfigureServerRequest::new(id)
        });
    }

    let new_billing = data
        .has_change("billing_cycle")
        .then(|| spec.billing_cycle.clone())
        .filter(|b| !b.is_empty());
    let traffic_changed = data.has_change("monthly_traffic_package");
    let new_traffic = traffic_changed
        .then(|| spec.monthly_traffic_package.clone())
        .filter(|t| !t.is_empty());
    if new_billing.is_some() || new_traffic.is_some() {
        let prior_traffic = data
            .get_change("monthly_traffic_package")
            .0
            .and_then(Value::as_str)
            .filter(|_| traffic_changed)
            .map(str::to_string);
        requests.push(ConfigureServerRequest {
            billing_cycle: new_billing,
            monthly_package: new_traffic.or(prior_traffic).filter(|t| !t.is_empty()),
            ..ConfigureServerRequest::new(id)
        });
    }

    if data.has_change("daily_backup") {
        requests.push(ConfigureServerRequest {
            daily_backup: Some(yes_no(spec.daily_backup)),
            ..ConfigureServerRequest::new(id)
        });
    }

    if data.has_change("managed") {
        requests.push(ConfigureServerRequest {
            managed: Some(yes_no(spec.managed)),
            ..ConfigureServerRequest::new(id)
        });
    }

    requests
}

#[async_trait]
impl Resource for ServerResource {
    fn type_name(&self) -> &str {
        SERVER_RESOURCE
    }

    async fn validate(&self, data: &dyn ResourceData) -> skyform_cloud::Result<()> {
        Ok(self.validate_data(data).await?)
    }

    async fn create(&self, data: &mut dyn ResourceData) -> skyform_cloud::Result<()> {
        Ok(self.create_server(data).await?)
    }

    async fn read(&self, data: &mut dyn ResourceData) -> skyform_cloud::Result<()> {
        Ok(self.read_server(data).await?)
    }

    async fn update(&self, data: &mut dyn ResourceData) -> skyform_cloud::Result<()> {
        Ok(self.update_server(data).await?)
    }

    async fn delete(&self, data: &mut dyn ResourceData) -> skyform_cloud::Result<()> {
        Ok(self.delete_server(data).await?)
    }

    async fn import(&self, data: &mut dyn ResourceData) -> skyform_cloud::Result<()> {
        Ok(self.import_server(data).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_options::tests::sample_options;
    use crate::testing::{Call, ScriptedApi};
    use serde_json::Map;
    use skyform_cloud::{CloudError, MemoryResourceData};

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn server_record() -> Value {
        json!({
            "id": "srv-internal-1",
            "name": "web-01-abc",
            "cpu": "2B",
            "diskSizes": [10],
            "power": "on",
            "datacenter": "EU",
            "ram": 1024,
            "backup": "0",
            "managed": "0",
            "billing": "hourly",
            "traffic": "t5000",
            "priceMonthlyOn": "10.00",
            "priceHourlyOn": "0.014",
            "priceHourlyOff": "0.003",
            "networks": [
                {"network": "wan-eu-1", "ips": ["203.0.113.5"]},
                {"network": "lan-eu-app", "ips": ["172.16.0.10"]}
            ]
        })
    }

    /// Routes by path; `create` is the body of `POST service/server`
    fn server_api(create: Value) -> ScriptedApi {
        ScriptedApi::new(move |call: &Call| match call.path.as_str() {
            "service/server" => Ok(create.clone()),
            "service/server/info" => Ok(json!([server_record()])),
            p if p.starts_with("service/queue") => Ok(json!([{
                "status": "complete",
                "log": "Creating server\nName: web-01-abc\nDone"
            }])),
            _ => Ok(json!(["cmd-1"])),
        })
    }

    fn resource(api: ScriptedApi) -> (Arc<ScriptedApi>, ServerResource) {
        let api = Arc::new(api);
        let resource = ServerResource::new(
            api.clone(),
            WaitConfig::default(),
            Arc::new(ServerOptionsCache::preloaded(sample_options())),
        );
        (api, resource)
    }

    fn desired() -> Map<String, Value> {
        map(json!({
            "name": "web-01",
            "datacenter_id": "EU",
            "image_id": "EU:ubuntu_22.04",
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_with_generated_password() {
        let (api, server) = resource(server_api(json!({
            "password": "Gen3rated",
            "commandIds": ["c-1"]
        })));
        let mut data = MemoryResourceData::from_desired(desired());

        server.create(&mut data).await.unwrap();

        assert_eq!(data.id(), "web-01-abc");
        assert_eq!(data.get_str("generated_password"), Some("Gen3rated"));
        assert_eq!(data.get_str("internal_server_id"), Some("srv-internal-1"));

        let requests = api.requests();
        let create = &requests[0];
        assert_eq!(create.path, "service/server");
        let body = create.body.as_ref().unwrap();
        assert_eq!(body["password"], GENERATE_PASSWORD);
        assert_eq!(body["passwordValidate"], GENERATE_PASSWORD);
        assert_eq!(body["cpu"], "2B");
        assert_eq!(body["ram"], 1024);
        assert_eq!(body["disk"], "size=10");
        assert_eq!(body["network"], "name=wan,ip=auto");
        assert_eq!(body["billingcycle"], "hourly");
        assert_eq!(body["poweronaftercreate"], "yes");
        assert_eq!(body["dailybackup"], "no");
        assert_eq!(body["quantity"], "1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_with_password_and_custom_attributes() {
        let (api, server) = resource(server_api(json!(["c-1"])));
        let mut attributes = desired();
        attributes.insert("password".into(), json!("S3cure!pass"));
        attributes.insert("disk_sizes_gb".into(), json!([20, 50]));
        attributes.insert(
            "network".into(),
            json!([{"name": "wan"}, {"name": "lan-eu-app", "ip": "172.16.0.10"}]),
        );
        attributes.insert("power_on".into(), json!(false));
        let mut data = MemoryResourceData::from_desired(attributes);

        server.create(&mut data).await.unwrap();

        assert_eq!(data.get_str("generated_password"), Some(""));
        let body = api.bodies().remove(0);
        assert_eq!(body["password"], "S3cure!pass");
        assert_eq!(body["disk"], "size=20 size=50");
        assert_eq!(body["network"], "name=wan,ip=auto name=lan-eu-app,ip=172.16.0.10");
        assert_eq!(body["poweronaftercreate"], "no");
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_without_name_in_log() {
        let (_, server) = resource(ScriptedApi::new(|call: &Call| {
            if call.is_queue_poll() {
                Ok(json!([{"status": "complete", "log": "queued"}]))
            } else {
                Ok(json!(["c-1"]))
            }
        }));
        let mut attributes = desired();
        attributes.insert("password".into(), json!("S3cure!pass"));
        let mut data = MemoryResourceData::from_desired(attributes);

        let err = server.create(&mut data).await.unwrap_err();

        let inner = err.provider_error::<KamateraError>().unwrap();
        assert!(matches!(
            inner,
            KamateraError::MalformedResponse(m) if m.contains("created server name")
        ));
        assert_eq!(data.id(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_rejects_multiple_command_ids() {
        let (_, server) = resource(server_api(json!(["c-1", "c-2"])));
        let mut attributes = desired();
        attributes.insert("password".into(), json!("S3cure!pass"));
        let mut data = MemoryResourceData::from_desired(attributes);

        assert!(server.create(&mut data).await.is_err());
    }

    #[tokio::test]
    async fn test_read_by_name_then_by_internal_id() {
        let (api, server) = resource(server_api(json!([])));
        let mut data = MemoryResourceData::from_id("web-01-abc");

        server.read(&mut data).await.unwrap();
        server.read(&mut data).await.unwrap();

        let bodies = api.bodies();
        assert_eq!(bodies[0], json!({"id": "", "name": "web-01-abc"}));
        assert_eq!(bodies[1], json!({"id": "srv-internal-1", "name": ""}));

        assert_eq!(data.get_str("cpu_type"), Some("B"));
        assert_eq!(data.get_i64("cpu_cores"), Some(2));
        assert_eq!(data.get("disk_sizes_gb"), Some(&json!([10])));
        assert_eq!(data.get_bool("power_on"), Some(true));
        assert_eq!(data.get("public_ips"), Some(&json!(["203.0.113.5"])));
        assert_eq!(data.get("private_ips"), Some(&json!(["172.16.0.10"])));
        assert_eq!(data.get_str("price_hourly_off"), Some("0.003"));
    }

    #[tokio::test]
    async fn test_read_hex_cpu_cores() {
        let mut record = server_record();
        record["cpu"] = json!("10D");
        let (_, server) = resource(ScriptedApi::sequence(vec![Ok(json!([record]))]));
        let mut data = MemoryResourceData::from_id("web-01-abc");

        server.read(&mut data).await.unwrap();

        assert_eq!(data.get_i64("cpu_cores"), Some(16));
        assert_eq!(data.get_str("cpu_type"), Some("D"));
    }

    #[tokio::test]
    async fn test_read_rejects_unparseable_disk_size() {
        let mut record = server_record();
        record["diskSizes"] = json!([10, null, 30]);
        let (_, server) = resource(ScriptedApi::sequence(vec![Ok(json!([record]))]));
        let mut data = MemoryResourceData::from_id("web-01-abc");

        let err = server.read(&mut data).await.unwrap_err();

        assert!(matches!(
            err.provider_error::<KamateraError>(),
            Some(KamateraError::MalformedResponse(message)) if message.contains("invalid disk size")
        ));
        assert!(data.get("disk_sizes_gb").is_none());
    }

    #[tokio::test]
    async fn test_read_keeps_disk_positions() {
        let mut record = server_record();
        record["diskSizes"] = json!([10, "20", 30.0]);
        let (_, server) = resource(ScriptedApi::sequence(vec![Ok(json!([record]))]));
        let mut data = MemoryResourceData::from_id("web-01-abc");

        server.read(&mut data).await.unwrap();

        assert_eq!(data.get("disk_sizes_gb"), Some(&json!([10, 20, 30])));
    }

    #[tokio::test]
    async fn test_read_missing_server() {
        let (_, server) = resource(ScriptedApi::sequence(vec![Ok(json!([]))]));
        let mut data = MemoryResourceData::from_id("gone");

        let err = server.read(&mut data).await.unwrap_err();

        assert!(matches!(
            err.provider_error::<KamateraError>(),
            Some(KamateraError::ServerNotFound(name)) if name == "gone"
        ));
    }

    fn existing(prior: Value, desired: Value) -> MemoryResourceData {
        let mut prior = map(prior);
        prior.insert("internal_server_id".into(), json!("srv-internal-1"));
        let mut current = prior.clone();
        current.extend(map(desired));
        MemoryResourceData::from_change("web-01-abc", prior, current)
    }

    fn base() -> Value {
        json!({
            "name": "web-01-abc",
            "datacenter_id": "EU",
            "image_id": "EU:ubuntu_22.04",
            "cpu_type": "B",
            "cpu_cores": 2,
            "ram_mb": 1024,
            "disk_sizes_gb": [10],
            "power_on": true,
            "password": "0ld-pass"
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_order() {
        let (api, server) = resource(server_api(json!([])));
        let mut data = existing(
            base(),
            json!({
                "cpu_cores": 4,
                "ram_mb": 2048,
                "daily_backup": true,
                "disk_sizes_gb": [20, 50],
                "password": "N3w-pass",
                "name": "web-02",
                "power_on": false
            }),
        );

        server.update(&mut data).await.unwrap();

        let paths: Vec<String> = api.requests().into_iter().map(|c| c.path).collect();
        assert_eq!(
            paths,
            vec![
                "server/configure",
                "server/configure",
                "server/configure",
                "server/disk",
                "server/disk",
                "service/server/password",
                "service/server/rename",
                "service/server/poweroff",
                "service/server/info",
            ]
        );

        let bodies = api.bodies();
        assert_eq!(bodies[0], json!({"id": "srv-internal-1", "cpu": "4B"}));
        assert_eq!(bodies[1], json!({"id": "srv-internal-1", "ram": 2048}));
        assert_eq!(bodies[2], json!({"id": "srv-internal-1", "dailybackup": "yes"}));
        assert_eq!(bodies[3], json!({"id": "srv-internal-1", "add": "50gb"}));
        assert_eq!(bodies[4], json!({"id": "srv-internal-1", "resize": "0", "size": "20gb"}));
        assert_eq!(bodies[5], json!({"id": "srv-internal-1", "password": "N3w-pass"}));
        assert_eq!(bodies[6], json!({"id": "srv-internal-1", "new-name": "web-02"}));
        assert_eq!(bodies[7], json!({"id": "srv-internal-1", "force": false}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_billing_and_traffic() {
        let (api, server) = resource(server_api(json!([])));
        let mut data = existing(
            base(),
            json!({"billing_cycle": "monthly", "monthly_traffic_package": "t5000"}),
        );

        server.update(&mut data).await.unwrap();

        assert_eq!(
            api.bodies()[0],
            json!({"id": "srv-internal-1", "billingcycle": "monthly", "monthlypackage": "t5000"})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_recreate_required() {
        let (api, server) = resource(server_api(json!([])));
        let mut data = existing(base(), json!({"image_id": "EU:debian_12", "cpu_cores": 4}));

        let err = server.update(&mut data).await.unwrap_err();

        assert!(err.to_string().contains("changing server image requires recreation"));
        assert!(api.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_recreate_allowed() {
        let (api, server) = resource(server_api(json!([])));
        let mut data = existing(
            base(),
            json!({"datacenter_id": "US", "allow_recreate": true}),
        );

        server.update(&mut data).await.unwrap();

        let paths: Vec<String> = api.requests().into_iter().map(|c| c.path).collect();
        assert_eq!(paths, vec!["service/server/info"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_password_failure_reverts() {
        let api = ScriptedApi::new(|call: &Call| match call.path.as_str() {
            "service/server/password" => Err(KamateraError::Api {
                status: 400,
                message: "password too weak".into(),
            }),
            _ => Ok(json!(["cmd-1"])),
        });
        let (api, server) = resource(api);
        let mut data = existing(base(), json!({"password": "weak"}));

        let err = server.update(&mut data).await.unwrap_err();

        assert!(err.to_string().contains("password too weak"));
        assert_eq!(data.get_str("password"), Some("0ld-pass"));
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_stops_on_configure_failure() {
        let api = ScriptedApi::new(|call: &Call| {
            if call.is_queue_poll() {
                Ok(json!([{"status": "error", "log": "not enough resources"}]))
            } else {
                Ok(json!(["cmd-1"]))
            }
        });
        let (api, server) = resource(api);
        let mut data = existing(base(), json!({"ram_mb": 4096, "disk_sizes_gb": [10, 20]}));

        let err = server.update(&mut data).await.unwrap_err();

        assert_eq!(err.to_string(), "kamatera command failed: not enough resources");
        assert_eq!(api.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_terminates_with_force() {
        let (api, server) = resource(server_api(json!([])));
        let mut data = existing(base(), json!({}));

        server.delete(&mut data).await.unwrap();

        let requests = api.requests();
        let request = &requests[0];
        assert_eq!(request.path, "service/server/terminate");
        assert_eq!(request.body, Some(json!({"id": "srv-internal-1", "force": true})));
        assert_eq!(data.id(), "");
    }

    #[tokio::test]
    async fn test_delete_without_internal_id() {
        let (api, server) = resource(server_api(json!([])));
        let mut data = MemoryResourceData::from_id("web-01-abc");

        assert!(server.delete(&mut data).await.is_err());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_import_by_internal_id() {
        let (api, server) = resource(server_api(json!([])));
        let mut data = MemoryResourceData::from_id("srv-internal-1");

        server.import(&mut data).await.unwrap();

        assert_eq!(api.bodies()[0], json!({"id": "srv-internal-1", "name": ""}));
        assert_eq!(data.get_str("name"), Some("web-01-abc"));
    }

    #[tokio::test]
    async fn test_import_empty_id() {
        let (_, server) = resource(server_api(json!([])));
        let mut data = MemoryResourceData::new();

        assert!(matches!(
            server.import(&mut data).await,
            Err(CloudError::InvalidImportId(_))
        ));
    }

    #[tokio::test]
    async fn test_validate_collects_all_errors() {
        let (_, server) = resource(server_api(json!([])));
        let mut attributes = desired();
        attributes.insert("name".into(), json!("a_b"));
        attributes.insert("cpu_cores".into(), json!(3));
        attributes.insert("disk_sizes_gb".into(), json!([10, 7]));
        attributes.insert("billing_cycle".into(), json!("weekly"));
        let data = MemoryResourceData::from_desired(attributes);

        let message = server.validate(&data).await.unwrap_err().to_string();

        assert!(message.starts_with("invalid configuration: invalid server configuration: "));
        assert!(message.contains("between 4 and 40"));
        assert!(message.contains("only letters, digits"));
        assert!(message.contains("unsupported CPU: 3B"));
        assert!(message.contains("unsupported disk size: 7 GB"));
        assert!(
            message.contains("billing cycle must be either 'hourly' or 'monthly', got 'weekly'")
        );
    }

    #[tokio::test]
    async fn test_validate_defaults_pass() {
        let (_, server) = resource(server_api(json!([])));
        let data = MemoryResourceData::from_desired(desired());
        server.validate(&data).await.unwrap();
    }

    #[test]
    fn test_validate_monthly_requires_known_package() {
        let data = MemoryResourceData::from_desired(desired())
            .with_attribute("billing_cycle", json!("monthly"))
            .with_attribute("monthly_traffic_package", json!("t9999"));
        let spec = ServerSpec::from_data(&data).unwrap();

        let err = validate_server(&sample_options(), &spec).unwrap_err();
        assert!(
            err.to_string()
                .contains("unsupported monthly traffic package for EU datacenter: t9999")
        );
    }

    #[test]
    fn test_spec_defaults() {
        let spec = ServerSpec::from_data(&MemoryResourceData::from_desired(desired())).unwrap();
        assert_eq!(spec.cpu(), "2B");
        assert_eq!(spec.ram_mb, 1024);
        assert_eq!(spec.disk_sizes_gb, vec![10.0]);
        assert_eq!(spec.billing_cycle, "hourly");
        assert!(spec.power_on);
        assert_eq!(spec.networks, vec![ServerNetwork::default()]);
    }

    #[test]
    fn test_parse_cpu() {
        assert_eq!(parse_cpu("2B").unwrap(), ("B".to_string(), 2));
        assert_eq!(parse_cpu("1aT").unwrap(), ("T".to_string(), 26));
        assert!(parse_cpu("B").is_err());
        assert!(parse_cpu("").is_err());
    }

    #[test]
    fn test_created_server_name() {
        assert_eq!(
            created_server_name("a\nName: one\nName: two\n").as_deref(),
            Some("two")
        );
        assert_eq!(created_server_name("no name"), None);
    }
}
