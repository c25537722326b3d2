use std::path::Path;

use anyhow::{Context, bail};

use skylift_cluster::{start_cluster, stop_cluster};
use skylift_deploy::{DeployConfig, SshExec, cluster_template_vars, setup_cluster};
use skylift_health::{HealthOutcome, HttpStatusProbe, expected_cores, wait_until_converged};
use skylift_provider::Ec2Provider;

use crate::{AccessArgs, ConnectArgs};
use crate::confirm::confirm;

pub async fn stop(cluster: &str, connect: &ConnectArgs, yes: bool) -> anyhow::Result<()> {
    if !yes {
        let confirmed = confirm(
            &format!(
                "Are you sure you want to stop the cluster {cluster}?\n\
                 DATA ON EPHEMERAL DISKS WILL BE LOST, BUT THE CLUSTER WILL KEEP USING \
                 SPACE ON\nAMAZON EBS IF IT IS EBS-BACKED!!"
            ),
            &format!("Stop cluster {cluster}"),
        )?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let provider = Ec2Provider::connect(&connect.region).await;
    let stopped = stop_cluster(&provider, cluster).await?;
    println!("Stopped {stopped} instances.");
    Ok(())
}

pub async fn start(
    cluster: &str,
    connect: &ConnectArgs,
    access: &AccessArgs,
    wait: u64,
    instance_type: &str,
    swap: u32,
    template_dir: &Path,
) -> anyhow::Result<()> {
    let provider = Ec2Provider::connect(&connect.region).await;
    let nodes = start_cluster(&provider, cluster, wait).await?;
    let lead = nodes
        .lead()
        .context("cluster has no master")?
        .public_dns
        .clone();

    // Node addresses change across a stop/start cycle, so the
    // configuration is re-rendered and setup re-run. The cluster key
    // is already in place from the first setup.
    let config = DeployConfig {
        instance_type: instance_type.to_string(),
        swap_mb: swap,
        monitoring: false,
    };
    let vars = cluster_template_vars(&nodes, &config);
    let exec = SshExec::new(&access.user, &access.identity_file);
    setup_cluster(&exec, &lead, template_dir, &vars, None).await?;

    let expected = expected_cores(instance_type, nodes.workers.len() as u32);
    let outcome = wait_until_converged(&HttpStatusProbe, &exec, &lead, expected).await?;
    if let HealthOutcome::Exhausted { expected, observed } = outcome {
        bail!("cluster health check failed: expected {expected} cores, saw {observed:?}");
    }

    println!("Cluster {cluster} restarted: master is {lead}");
    Ok(())
}
