use anyhow::Context;
use tracing::info;

use skylift_cluster::{DiscoveryMode, find_cluster};
use skylift_deploy::SshExec;
use skylift_provider::Ec2Provider;

use crate::{AccessArgs, ConnectArgs};

pub async fn login(
    cluster: &str,
    connect: &ConnectArgs,
    access: &AccessArgs,
    proxy_port: Option<&str>,
) -> anyhow::Result<()> {
    let provider = Ec2Provider::connect(&connect.region).await;
    let nodes = find_cluster(&provider, cluster, DiscoveryMode::Strict).await?;
    let lead = nodes
        .lead()
        .context("cluster has no master")?
        .public_dns
        .clone();

    info!(%lead, "logging into master");
    if let Some(port) = proxy_port {
        info!(%port, "SOCKS proxy forwarded over the session");
    }
    let exec = SshExec::new(&access.user, &access.identity_file);
    exec.interactive_shell(&lead, proxy_port).await?;
    Ok(())
}
