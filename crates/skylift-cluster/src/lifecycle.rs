//! Stop and start for an existing cluster.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info};

use skylift_provider::{CloudProvider, InstanceState, Role};

use crate::discovery::{ClusterNodes, DiscoveryMode, find_cluster};
use crate::error::ClusterResult;

const PENDING_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// States that no longer accept stop/start requests.
fn past_recovery(state: InstanceState) -> bool {
    matches!(
        state,
        InstanceState::ShuttingDown | InstanceState::Terminated
    )
}

/// Stop every node of the cluster. Returns how many stop requests were
/// issued. An empty cluster is fine; nothing happens.
pub async fn stop_cluster<P: CloudProvider>(provider: &P, cluster: &str) -> ClusterResult<usize> {
    let nodes = find_cluster(provider, cluster, DiscoveryMode::Permissive).await?;
    let mut stopped = 0;
    for role in [Role::Master, Role::Worker, Role::Coordinator] {
        let ids: Vec<String> = nodes
            .group(role)
            .iter()
            .filter(|i| !past_recovery(i.state))
            .map(|i| i.id.clone())
            .collect();
        if ids.is_empty() {
            continue;
        }
        info!(%role, count = ids.len(), "stopping nodes");
        provider.stop_instances(&ids).await?;
        stopped += ids.len();
    }
    Ok(stopped)
}

/// Start every node of a stopped cluster and wait for the fleet to
/// leave the pending state, plus `wait_secs` of extra settle time.
///
/// Strict discovery: starting a cluster with no master or no workers
/// is an error.
pub async fn start_cluster<P: CloudProvider>(
    provider: &P,
    cluster: &str,
    wait_secs: u64,
) -> ClusterResult<ClusterNodes> {
    let nodes = find_cluster(provider, cluster, DiscoveryMode::Strict).await?;

    for role in [Role::Worker, Role::Master, Role::Coordinator] {
        let ids: Vec<String> = nodes
            .group(role)
            .iter()
            .filter(|i| !past_recovery(i.state))
            .map(|i| i.id.clone())
            .collect();
        if ids.is_empty() {
            continue;
        }
        info!(%role, count = ids.len(), "starting nodes");
        provider.start_instances(&ids).await?;
    }

    let all_ids: Vec<String> = nodes.all().map(|i| i.id.clone()).collect();
    loop {
        let instances = provider.describe_instances(&all_ids).await?;
        let pending = instances
            .iter()
            .filter(|i| i.state == InstanceState::Pending)
            .count();
        if pending == 0 {
            break;
        }
        debug!(pending, "instances still pending");
        sleep(PENDING_POLL_INTERVAL).await;
    }
    if wait_secs > 0 {
        info!(secs = wait_secs, "waiting for nodes to finish booting");
        sleep(Duration::from_secs(wait_secs)).await;
    }

    find_cluster(provider, cluster, DiscoveryMode::Strict).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use skylift_provider::{InstanceState, MemoryProvider};

    #[tokio::test(start_paused = true)]
    async fn stop_issues_requests_for_live_nodes_only() {
        let provider = MemoryProvider::new();
        let master = provider.seed_node("demo", Role::Master, InstanceState::Running);
        provider.seed_node("demo", Role::Worker, InstanceState::Running);
        provider.seed_node("demo", Role::Worker, InstanceState::Terminated);

        let stopped = stop_cluster(&provider, "demo").await.unwrap();
        assert_eq!(stopped, 2);
        assert_eq!(
            provider.instance(&master).unwrap().state,
            InstanceState::Stopped
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_on_an_empty_cluster_is_a_no_op() {
        let provider = MemoryProvider::new();
        let stopped = stop_cluster(&provider, "demo").await.unwrap();
        assert_eq!(stopped, 0);
        assert_eq!(provider.stop_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn start_brings_a_stopped_cluster_back() {
        let provider = MemoryProvider::new();
        provider.seed_node("demo", Role::Master, InstanceState::Stopped);
        provider.seed_node("demo", Role::Worker, InstanceState::Stopped);

        let nodes = start_cluster(&provider, "demo", 0).await.unwrap();
        assert!(nodes.all().all(|i| i.state == InstanceState::Running));
    }

    #[tokio::test(start_paused = true)]
    async fn start_requires_a_well_formed_cluster() {
        let provider = MemoryProvider::new();
        provider.seed_node("demo", Role::Worker, InstanceState::Stopped);
        assert!(start_cluster(&provider, "demo", 0).await.is_err());
    }
}
