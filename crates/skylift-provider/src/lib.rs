//! skylift-provider — the cloud provider boundary for skylift.
//!
//! A skylift cluster has no control plane and no database: the provider's
//! tag store is the only durable state. This crate defines the domain
//! types the orchestrator reasons about (instances and their lifecycle
//! states, security groups and ingress rules, spot requests, zones) and
//! the [`CloudProvider`] trait the orchestrator drives.
//!
//! Two implementations ship here:
//!
//! - [`Ec2Provider`] — the real thing, backed by `aws-sdk-ec2`.
//! - [`MemoryProvider`] — an in-memory fake with scripted eventual
//!   consistency, used by the orchestrator's tests.

pub mod api;
pub mod ec2;
pub mod error;
pub mod memory;
pub mod types;

pub use api::CloudProvider;
pub use ec2::Ec2Provider;
pub use error::{ProviderError, ProviderResult};
pub use memory::MemoryProvider;
pub use types::*;
