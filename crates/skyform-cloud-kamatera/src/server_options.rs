//! Catalog of valid server options
//!
//! Kamatera publishes the accepted CPU, RAM, disk and traffic values as a
//! JavaScript snippet for its price calculator. The JSON object sits between
//! the first and the last single quote of that file.

use crate::error::{KamateraError, Result};
use serde_json::Value;
use tokio::sync::OnceCell;

pub const SERVER_OPTIONS_URL: &str = "https://console.kamatera.com/info/calculator.js.php";

/// Parsed calculator data
#[derive(Debug, Clone, PartialEq)]
pub struct ServerOptions {
    root: Value,
}

impl ServerOptions {
    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// Extract the options object from the calculator script
    pub fn parse(script: &str) -> Result<Self> {
        let (start, end) = match (script.find('\''), script.rfind('\'')) {
            (Some(start), Some(end)) if end > start => (start, end),
            _ => return Err(KamateraError::ServerOptions("unexpected content format".into())),
        };

        let root: Value = serde_json::from_str(&script[start + 1..end])
            .map_err(|_| KamateraError::ServerOptions("invalid JSON format in response".into()))?;
        Ok(Self { root })
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// `options` array of the first entry under a literal top-level key
    fn options(&self, key: &str) -> &[Value] {
        self.root
            .get(key)
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("options"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn has_text_option(&self, key: &str, wanted: &str) -> bool {
        self.options(key)
            .iter()
            .any(|option| option.get("value").map(text).as_deref() == Some(wanted))
    }

    fn has_number_option(&self, key: &str, wanted: f64) -> bool {
        self.options(key)
            .iter()
            .any(|option| option.get("value").and_then(number) == Some(wanted))
    }

    pub fn validate_datacenter(&self, datacenter_id: &str) -> std::result::Result<(), String> {
        let traffic_key = format!("netPck.{}", datacenter_id);
        let in_traffic = self.root.get(&traffic_key).is_some();
        let in_os = self
            .root
            .get("os")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|os| os.get("datacenters").and_then(Value::as_array))
            .flatten()
            .any(|dc| text(dc) == datacenter_id);

        if in_traffic || in_os {
            Ok(())
        } else {
            Err(format!("unsupported datacenter ID: {}", datacenter_id))
        }
    }

    /// `cpu` is cores followed by type, e.g. `2B`
    pub fn validate_cpu(&self, cpu: &str) -> std::result::Result<(), String> {
        if self.has_text_option("cpu", cpu) {
            Ok(())
        } else {
            Err(format!("unsupported CPU: {}", cpu))
        }
    }

    pub fn validate_disk_size_gb(&self, size_gb: f64) -> std::result::Result<(), String> {
        if self.has_number_option("diskGB", size_gb) {
            Ok(())
        } else {
            Err(format!("unsupported disk size: {} GB", size_gb))
        }
    }

    pub fn validate_monthly_traffic_package(
        &self,
        datacenter_id: &str,
        package: &str,
    ) -> std::result::Result<(), String> {
        if self.has_text_option(&format!("netPck.{}", datacenter_id), package) {
            Ok(())
        } else {
            Err(format!(
                "unsupported monthly traffic package for {} datacenter: {}",
                datacenter_id, package
            ))
        }
    }

    pub fn validate_ram_mb(&self, cpu_type: &str, ram_mb: i64) -> std::result::Result<(), String> {
        if self.has_number_option(&format!("ramMB.{}", cpu_type), ram_mb as f64) {
            Ok(())
        } else {
            Err(format!("unsupported RAM size for CPU type {}: {} MB", cpu_type, ram_mb))
        }
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Download-once holder for [`ServerOptions`]
///
/// The first caller downloads; concurrent callers wait for that download and
/// later callers reuse it. A failed download is not remembered, the next
/// caller tries again.
pub struct ServerOptionsCache {
    http: reqwest::Client,
    url: String,
    cell: OnceCell<ServerOptions>,
}

impl ServerOptionsCache {
    pub fn new() -> Self {
        Self::with_url(SERVER_OPTIONS_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            cell: OnceCell::new(),
        }
    }

    /// Cache that never downloads
    pub fn preloaded(options: ServerOptions) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: SERVER_OPTIONS_URL.to_string(),
            cell: OnceCell::new_with(Some(options)),
        }
    }

    pub async fn get(&self) -> Result<&ServerOptions> {
        self.cell.get_or_try_init(|| self.download()).await
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    async fn download(&self) -> Result<ServerOptions> {
        tracing::debug!("Downloading server options from {}", self.url);

        let script = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| {
                KamateraError::ServerOptions(format!("failed to download server options: {}", e))
            })?
            .text()
            .await
            .map_err(|e| {
                KamateraError::ServerOptions(format!("failed to read response body: {}", e))
            })?;

        ServerOptions::parse(&script)
    }
}

impl Default for ServerOptionsCache {
    fn default() -> Self {
        Self::new()
    }
}
