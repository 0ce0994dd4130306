//! Command completion protocol
//!
//! Every mutating Kamatera call returns immediately with a command id; the
//! actual work (create, resize, power...) runs in a remote queue. The waiter
//! polls `service/queue?id=<id>` at a fixed interval until the command
//! reaches a terminal status or the ceiling elapses. Dropping the returned
//! future stops the polling; the remote command itself keeps running.

use crate::client::{self, ApiTransport};
use crate::error::{KamateraError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Fixed delay between two status polls
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Ceiling for a single command (2400 s = 40 min)
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(2400);

/// Polling settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            timeout: WAIT_TIMEOUT,
        }
    }
}

/// Status reported by the queue endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Pending,
    Complete,
    Error,
    /// Any other value, or no status field at all
    Unknown(Option<String>),
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandStatus::Complete | CommandStatus::Error)
    }
}

/// One entry of the remote command queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<Value>,

    /// Remaining fields, kept as returned
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CommandRecord {
    pub fn status(&self) -> CommandStatus {
        match self.status.as_ref().and_then(Value::as_str) {
            Some("pending") => CommandStatus::Pending,
            Some("complete") => CommandStatus::Complete,
            Some("error") => CommandStatus::Error,
            Some(other) => CommandStatus::Unknown(Some(other.to_string())),
            None => CommandStatus::Unknown(self.status.as_ref().map(Value::to_string)),
        }
    }

    /// Free-text log attached on completion or failure
    pub fn log(&self) -> Option<String> {
        match self.log.as_ref()? {
            Value::String(log) => Some(log.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Log text if present, else the whole record
    fn failure_message(&self) -> String {
        self.log().unwrap_or_else(|| {
            serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
        })
    }
}

/// Parse the command id list returned by a mutating call
pub fn command_ids(value: Value) -> Result<Vec<String>> {
    let ids = match value {
        Value::Array(ids) => ids,
        other => {
            return Err(KamateraError::malformed(format!(
                "expected a list of command ids, got {}",
                other
            )));
        }
    };

    ids.into_iter()
        .map(|id| match id {
            Value::String(id) => Ok(id),
            Value::Number(id) => Ok(id.to_string()),
            other => Err(KamateraError::malformed(format!(
                "invalid command id {}",
                other
            ))),
        })
        .collect()
}

/// Exactly one command id, as every single-object mutation returns
pub fn single_command_id(value: Value) -> Result<String> {
    let mut ids = command_ids(value)?;
    if ids.len() != 1 {
        return Err(KamateraError::malformed(format!(
            "did not return expected command ID (got {})",
            ids.len()
        )));
    }
    Ok(ids.remove(0))
}

/// Polls queued commands to a terminal state
pub struct CommandWaiter<'a> {
    api: &'a dyn ApiTransport,
    config: WaitConfig,
}

impl<'a> CommandWaiter<'a> {
    pub fn new(api: &'a dyn ApiTransport) -> Self {
        Self::with_config(api, WaitConfig::default())
    }

    pub fn with_config(api: &'a dyn ApiTransport, config: WaitConfig) -> Self {
        Self { api, config }
    }

    pub fn api(&self) -> &'a dyn ApiTransport {
        self.api
    }

    pub fn config(&self) -> WaitConfig {
        self.config
    }

    /// Wait until `command_id` completes
    ///
    /// Returns the record unchanged on `complete`. Fails with
    /// `CommandFailed` on `error`, `Timeout` once the ceiling has passed, and
    /// immediately on any query failure.
    pub async fn wait(&self, command_id: &str) -> Result<CommandRecord> {
        let started = Instant::now();

        loop {
            sleep(self.config.poll_interval).await;

            let waited = started.elapsed();
            if waited > self.config.timeout {
                tracing::warn!("Command {} still running after {:?}", command_id, waited);
                return Err(KamateraError::Timeout {
                    command_id: command_id.to_string(),
                    waited,
                });
            }

            let record = self.poll(command_id).await?;
            match record.status() {
                CommandStatus::Complete => {
                    tracing::debug!("Command {} complete", command_id);
                    return Ok(record);
                }
                CommandStatus::Error => {
                    return Err(KamateraError::CommandFailed(record.failure_message()));
                }
                status => {
                    tracing::debug!("Command {} not finished: {:?}", command_id, status);
                }
            }
        }
    }

    /// Query the queue once
    pub async fn poll(&self, command_id: &str) -> Result<CommandRecord> {
        let value = client::get(self.api, &format!("service/queue?id={}", command_id)).await?;
        let mut records: Vec<Value> = client::decode(value, "queue")?;
        if records.len() != 1 {
            return Err(KamateraError::malformed(format!(
                "invalid number of command responses from queue API: {}",
                records.len()
            )));
        }
        client::decode(records.remove(0), "queue")
    }

    /// POST a mutation and wait for the single command it queues
    pub async fn execute<T>(&self, path: &str, body: &T) -> Result<CommandRecord>
    where
        T: Serialize + Sync + ?Sized,
    {
        let response = client::post(self.api, path, body).await?;
        let command_id = single_command_id(response)?;
        tracing::debug!("{} queued command {}", path, command_id);
        self.wait(&command_id).await
    }
}

/// Wait for a command with the default interval and ceiling
pub async fn wait_command(api: &dyn ApiTransport, command_id: &str) -> Result<CommandRecord> {
    CommandWaiter::new(api).wait(command_id).await
}
