//! Cluster teardown under eventual consistency.
//!
//! Two independent phases. Termination is fire-and-forget: requests are
//! issued and never polled, so teardown does not block on the provider
//! finishing. Group deletion has to tolerate the provider's lagging
//! view of terminated instances and revoked rules, so it runs as a
//! bounded retry loop with a long settle pause per attempt.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use skylift_provider::{CloudProvider, Role};

use crate::discovery::{DiscoveryMode, find_cluster};
use crate::error::ClusterResult;

/// Attempts before giving up on group deletion.
pub const GROUP_DELETE_ATTEMPTS: u32 = 3;
/// Pause per attempt for instance termination and rule revocation to
/// become visible. Yes, it has to be this long.
const GROUP_DELETE_SETTLE: Duration = Duration::from_secs(30);

/// Terminate every active node of the cluster. Returns the number of
/// terminate requests issued; zero when the cluster is already gone.
pub async fn terminate_cluster<P: CloudProvider>(
    provider: &P,
    cluster: &str,
) -> ClusterResult<usize> {
    let nodes = find_cluster(provider, cluster, DiscoveryMode::Permissive).await?;
    if nodes.is_empty() {
        info!(%cluster, "no active nodes found");
        return Ok(0);
    }

    let mut terminated = 0;
    for role in [Role::Master, Role::Worker, Role::Coordinator] {
        let ids: Vec<String> = nodes.group(role).iter().map(|i| i.id.clone()).collect();
        if ids.is_empty() {
            continue;
        }
        info!(%role, count = ids.len(), "terminating nodes");
        provider.terminate_instances(&ids).await?;
        terminated += ids.len();
    }
    Ok(terminated)
}

/// How group deletion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupDeleteOutcome {
    /// Every target group is gone.
    Deleted,
    /// The attempt budget ran out; the operator should retry later,
    /// once the provider has caught up with the terminations.
    RetryLater,
}

/// Delete the cluster's three role groups.
///
/// Each attempt re-lists the groups, revokes every remaining grant
/// rule-by-rule (revocations between the groups break their mutual
/// trust dependencies, which would otherwise block deletion), waits a
/// settle interval, and deletes. Any single failure voids the whole
/// attempt. Exhausting the budget is an outcome, not an error.
pub async fn delete_security_groups<P: CloudProvider>(
    provider: &P,
    cluster: &str,
) -> ClusterResult<GroupDeleteOutcome> {
    let targets: Vec<String> = Role::ALL.iter().map(|r| r.group_name(cluster)).collect();

    for attempt in 1..=GROUP_DELETE_ATTEMPTS {
        info!(attempt, "deleting security groups (this can take a while)");
        let groups: Vec<_> = provider
            .list_security_groups()
            .await?
            .into_iter()
            .filter(|g| targets.contains(&g.name))
            .collect();

        let mut success = true;
        for group in &groups {
            info!(group = %group.name, rules = group.rules.len(), "revoking ingress rules");
            for rule in &group.rules {
                if let Err(err) = provider.revoke_ingress(&group.name, rule).await {
                    warn!(group = %group.name, %err, "failed to revoke rule");
                    success = false;
                }
            }
        }

        sleep(GROUP_DELETE_SETTLE).await;

        for group in &groups {
            match provider.delete_security_group(&group.name).await {
                Ok(()) => info!(group = %group.name, "deleted security group"),
                Err(err) => {
                    warn!(group = %group.name, %err, "failed to delete security group");
                    success = false;
                }
            }
        }

        if success {
            return Ok(GroupDeleteOutcome::Deleted);
        }
    }

    warn!(
        attempts = GROUP_DELETE_ATTEMPTS,
        "could not delete all security groups; try again in a few minutes"
    );
    Ok(GroupDeleteOutcome::RetryLater)
}
