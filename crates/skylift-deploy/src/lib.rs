//! skylift-deploy — pushing configuration onto a launched cluster.
//!
//! Renders a configuration template tree with cluster-derived values,
//! ships it to the lead node in one bulk transfer, and runs the setup
//! scripts there. Remote access is a capability — run a command, copy a
//! file, sync a tree — implemented over plain ssh/scp/rsync.

pub mod deploy;
pub mod error;
pub mod remote;
pub mod seed;
pub mod template;

pub use deploy::{DeployConfig, deploy_files, setup_cluster};
pub use error::{DeployError, DeployResult};
pub use remote::{RemoteExec, SshExec};
pub use seed::{SeedBuckets, copy_seed_data_from_s3, copy_seed_data_from_volume, s3_keys_from_env};
pub use template::{TemplateVars, cluster_template_vars, render, render_tree};
