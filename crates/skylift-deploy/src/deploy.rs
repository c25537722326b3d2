//! Deployment orchestration against the lead node.

use std::path::Path;

use tracing::info;

use crate::error::DeployResult;
use crate::remote::RemoteExec;
use crate::template::{TemplateVars, render_tree};

/// Framework modules installed on every cluster.
const DEFAULT_MODULES: &[&str] = &[
    "ephemeral-hdfs",
    "persistent-hdfs",
    "mesos",
    "spark-standalone",
    "training",
];

/// Setup repository cloned onto the lead node.
const SETUP_REPO: &str = "https://github.com/mesos/spark-ec2.git";
const SETUP_BRANCH: &str = "ampcamp3";
const SETUP_DIR: &str = "spark-ec2";

/// Knobs that shape the rendered configuration.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub instance_type: String,
    pub swap_mb: u32,
    pub monitoring: bool,
}

impl DeployConfig {
    /// Module list to install, in order.
    pub fn modules(&self) -> Vec<String> {
        let mut modules: Vec<String> = DEFAULT_MODULES.iter().map(|m| m.to_string()).collect();
        if self.monitoring {
            modules.push("ganglia".to_string());
        }
        modules
    }
}

/// Render the template tree into a scratch directory and sync it onto
/// the lead node's root filesystem. The scratch directory is removed
/// whether or not the transfer succeeds.
pub async fn deploy_files<E: RemoteExec>(
    exec: &E,
    lead: &str,
    template_root: &Path,
    vars: &TemplateVars,
) -> DeployResult<()> {
    let scratch = tempfile::tempdir()?;
    render_tree(template_root, scratch.path(), vars)?;
    info!(%lead, "deploying rendered configuration");
    let outcome = exec.sync_tree(lead, scratch.path()).await;
    drop(scratch);
    outcome
}

/// Full setup pass on the lead node: optional cluster key install,
/// setup-repository clone, configuration deploy, then the setup script.
pub async fn setup_cluster<E: RemoteExec>(
    exec: &E,
    lead: &str,
    template_root: &Path,
    vars: &TemplateVars,
    cluster_key: Option<&Path>,
) -> DeployResult<()> {
    if let Some(key) = cluster_key {
        info!(%lead, "installing cluster ssh key");
        exec.run_command(lead, "mkdir -p ~/.ssh").await?;
        exec.copy_file(lead, key, "~/.ssh/id_rsa").await?;
        exec.run_command(lead, "chmod 600 ~/.ssh/id_rsa").await?;
    }

    info!(%lead, "cloning setup scripts");
    exec.run_command(
        lead,
        &format!("rm -rf {SETUP_DIR} && git clone -b {SETUP_BRANCH} {SETUP_REPO}"),
    )
    .await?;

    deploy_files(exec, lead, template_root, vars).await?;

    info!(%lead, "running setup");
    exec.run_command(lead, &format!("chmod u+x {SETUP_DIR}/setup.sh"))
        .await?;
    exec.run_command(lead, &format!("{SETUP_DIR}/setup.sh")).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::RecordingExec;
    use std::fs;

    fn template_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("root/conf")).unwrap();
        fs::write(dir.path().join("root/conf/env.sh"), "SWAP={{swap}}").unwrap();
        dir
    }

    fn vars() -> TemplateVars {
        let mut vars = TemplateVars::new();
        vars.insert("swap".to_string(), "1024".to_string());
        vars
    }

    #[tokio::test]
    async fn deploy_renders_then_syncs_once() {
        let exec = RecordingExec::default();
        let templates = template_dir();

        deploy_files(&exec, "lead.example", templates.path(), &vars())
            .await
            .unwrap();

        let syncs = exec.syncs.lock().unwrap();
        assert_eq!(syncs.len(), 1);
        // Scratch directory is gone once the deploy returns.
        assert!(!Path::new(&syncs[0]).exists());
    }

    #[tokio::test]
    async fn deploy_cleans_scratch_on_transfer_failure() {
        let exec = RecordingExec {
            fail_sync: true,
            ..RecordingExec::default()
        };
        let templates = template_dir();

        let result = deploy_files(&exec, "lead.example", templates.path(), &vars()).await;
        assert!(result.is_err());
        let syncs = exec.syncs.lock().unwrap();
        assert!(!Path::new(&syncs[0]).exists());
    }

    #[tokio::test]
    async fn setup_installs_key_then_clones_then_runs() {
        let exec = RecordingExec::default();
        let templates = template_dir();
        let key = tempfile::NamedTempFile::new().unwrap();

        setup_cluster(
            &exec,
            "lead.example",
            templates.path(),
            &vars(),
            Some(key.path()),
        )
        .await
        .unwrap();

        let commands = exec.command_log();
        assert_eq!(commands[0], "mkdir -p ~/.ssh");
        assert_eq!(commands[1], "chmod 600 ~/.ssh/id_rsa");
        assert!(commands[2].contains("git clone -b ampcamp3"));
        assert_eq!(commands[3], "chmod u+x spark-ec2/setup.sh");
        assert_eq!(commands[4], "spark-ec2/setup.sh");

        let copies = exec.copies.lock().unwrap();
        assert_eq!(copies.as_slice(), &[(
            "lead.example".to_string(),
            "~/.ssh/id_rsa".to_string()
        )]);
        assert_eq!(exec.syncs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn setup_without_key_skips_the_install() {
        let exec = RecordingExec::default();
        let templates = template_dir();

        setup_cluster(&exec, "lead.example", templates.path(), &vars(), None)
            .await
            .unwrap();

        let commands = exec.command_log();
        assert!(commands[0].contains("git clone"));
        assert!(exec.copies.lock().unwrap().is_empty());
    }
}
