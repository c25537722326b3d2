//! skylift-cluster — the cluster lifecycle orchestrator.
//!
//! Everything here converges on provider-side truth: a cluster is
//! nothing but the set of instances carrying its name tag, rebuilt from
//! a full scan on every call. Operations are idempotent and resumable;
//! an interrupted invocation leaves only provider state behind, and the
//! next invocation rediscovers it.
//!
//! Single logical thread of control: one provider call at a time, fixed
//! sleeps between polls. Deliberate simplicity for small clusters, not a
//! performance posture.

pub mod discovery;
pub mod error;
pub mod groups;
pub mod instance_types;
pub mod launch;
pub mod lifecycle;
pub mod partition;
pub mod teardown;

pub use discovery::{ClusterNodes, DiscoveryMode, find_cluster};
pub use error::{ClusterError, ClusterResult};
pub use groups::ensure_security_groups;
pub use launch::{LaunchOptions, LaunchOutcome, ZonePolicy, launch_cluster};
pub use lifecycle::{start_cluster, stop_cluster};
pub use partition::partition;
pub use teardown::{GroupDeleteOutcome, delete_security_groups, terminate_cluster};
