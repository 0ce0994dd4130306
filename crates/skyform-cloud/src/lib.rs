//! skyform cloud resource contract
//!
//! This crate defines the narrow contract between a provisioning host engine
//! and the providers it drives. The host owns schemas, diffing and state
//! persistence; a provider implements a create/read/update/delete lifecycle
//! per resource type and sees instances only through [`ResourceData`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  host engine                     │
//! │        (plan, diff, state, per-resource lock)    │
//! └─────────────────┬───────────────────────────────┘
//!                   │ create / read / update / delete
//! ┌─────────────────▼───────────────────────────────┐
//! │                skyform-cloud                     │
//! │  trait Provider   trait Resource   ResourceData  │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!           ┌───────▼────────┐
//!           │    kamatera    │
//!           │    provider    │
//!           └────────────────┘
//! ```

pub mod data;
pub mod error;
pub mod provider;

// Re-exports
pub use data::{MemoryResourceData, ResourceData};
pub use error::{CloudError, Result};
pub use provider::{AuthStatus, DataSource, Provider, Resource};
