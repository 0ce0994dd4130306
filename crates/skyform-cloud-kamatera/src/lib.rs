//! Kamatera provider for skyform
//!
//! Maps `kamatera_server` and `kamatera_server_network` resources, plus the
//! `kamatera_datacenter` and `kamatera_image` data sources, onto the Kamatera
//! cloudcli REST API.
//!
//! # Command protocol
//!
//! Mutating calls return a command id. [`CommandWaiter`] polls the queue
//! endpoint every 2 seconds until the command completes, fails, or 40 minutes
//! pass. Drivers await each command before issuing the next call.
//!
//! # Disks
//!
//! [`compute_disk_diff`] turns prior/desired disk size lists into trailing
//! adds or removes plus positional resizes; [`apply_disk_operations`] issues
//! them one `server/disk` call at a time.
//!
//! # Example
//!
//! ```ignore
//! use skyform_cloud::{MemoryResourceData, Provider};
//! use skyform_cloud_kamatera::KamateraProvider;
//!
//! let provider = KamateraProvider::from_env()?;
//!
//! let auth = provider.check_auth().await?;
//! if !auth.authenticated {
//!     panic!("Not authenticated: {:?}", auth.error);
//! }
//!
//! let mut server = MemoryResourceData::from_id("web-01");
//! provider.resource("kamatera_server")?.read(&mut server).await?;
//! ```

pub mod client;
pub mod command;
pub mod config;
pub mod datacenter;
pub mod disk;
pub mod dto;
pub mod error;
pub mod image;
pub mod network;
pub mod provider;
pub mod server;
pub mod server_options;

#[cfg(test)]
mod testing;

pub use client::{ApiClient, ApiTransport};
pub use command::{
    CommandRecord, CommandStatus, CommandWaiter, POLL_INTERVAL, WAIT_TIMEOUT, WaitConfig,
    wait_command,
};
pub use config::ProviderConfig;
pub use disk::{DiskOperations, apply_disk_operations, compute_disk_diff};
pub use error::{KamateraError, Result};
pub use provider::KamateraProvider;
pub use server::{PowerOperation, ServerSpec, validate_server};
pub use server_options::{ServerOptions, ServerOptionsCache};
