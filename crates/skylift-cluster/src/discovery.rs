//! Cluster discovery from provider-side tags.
//!
//! A cluster has no object identity: it is reconstructed from scratch
//! on every call by scanning all instances and filtering on the
//! (cluster, role) tag pair. The result is a point-in-time snapshot —
//! nodes discovered now may be gone microseconds later.

use tracing::info;

use skylift_provider::{CloudProvider, Instance, Role};

use crate::error::{ClusterError, ClusterResult};

/// How discovery treats an empty or partial result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Missing masters or workers is a user-facing error. Used by
    /// operations that need a live, well-formed cluster.
    Strict,
    /// Empty results are valid. Used for pre-launch collision checks
    /// and for destroy/stop, where an already-gone cluster is fine.
    Permissive,
}

/// The live node set of a named cluster, bucketed by role.
#[derive(Debug, Clone, Default)]
pub struct ClusterNodes {
    pub coordinators: Vec<Instance>,
    pub masters: Vec<Instance>,
    pub workers: Vec<Instance>,
}

impl ClusterNodes {
    pub fn is_empty(&self) -> bool {
        self.coordinators.is_empty() && self.masters.is_empty() && self.workers.is_empty()
    }

    pub fn total(&self) -> usize {
        self.coordinators.len() + self.masters.len() + self.workers.len()
    }

    /// The lead node: the first master. It receives the rendered
    /// configuration and serves the status endpoint.
    pub fn lead(&self) -> Option<&Instance> {
        self.masters.first()
    }

    /// All nodes across every role group.
    pub fn all(&self) -> impl Iterator<Item = &Instance> {
        self.coordinators
            .iter()
            .chain(self.masters.iter())
            .chain(self.workers.iter())
    }

    pub fn group(&self, role: Role) -> &[Instance] {
        match role {
            Role::Coordinator => &self.coordinators,
            Role::Master => &self.masters,
            Role::Worker => &self.workers,
        }
    }
}

/// Resolve the live node set for `cluster`.
///
/// Keeps instances carrying both tags with a matching cluster name and
/// an active lifecycle state; everything else is invisible. No side
/// effects.
pub async fn find_cluster<P: CloudProvider>(
    provider: &P,
    cluster: &str,
    mode: DiscoveryMode,
) -> ClusterResult<ClusterNodes> {
    info!(%cluster, "searching for existing cluster");
    let mut nodes = ClusterNodes::default();

    for instance in provider.list_instances().await? {
        if !instance.state.is_active() {
            continue;
        }
        if instance.cluster() != Some(cluster) {
            continue;
        }
        match instance.role() {
            Some(Role::Coordinator) => nodes.coordinators.push(instance),
            Some(Role::Master) => nodes.masters.push(instance),
            Some(Role::Worker) => nodes.workers.push(instance),
            None => {}
        }
    }

    if !nodes.is_empty() {
        info!(
            %cluster,
            masters = nodes.masters.len(),
            workers = nodes.workers.len(),
            coordinators = nodes.coordinators.len(),
            "found cluster nodes"
        );
    }

    if mode == DiscoveryMode::Strict {
        if nodes.masters.is_empty() {
            return Err(ClusterError::NoMasters(cluster.to_string()));
        }
        if nodes.workers.is_empty() {
            return Err(ClusterError::NoWorkers(cluster.to_string()));
        }
    }

    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skylift_provider::{InstanceState, MemoryProvider};

    #[tokio::test]
    async fn buckets_nodes_by_role() {
        let provider = MemoryProvider::new();
        provider.seed_node("demo", Role::Master, InstanceState::Running);
        provider.seed_node("demo", Role::Worker, InstanceState::Running);
        provider.seed_node("demo", Role::Worker, InstanceState::Pending);
        provider.seed_node("demo", Role::Coordinator, InstanceState::Running);

        let nodes = find_cluster(&provider, "demo", DiscoveryMode::Strict)
            .await
            .unwrap();
        assert_eq!(nodes.masters.len(), 1);
        assert_eq!(nodes.workers.len(), 2);
        assert_eq!(nodes.coordinators.len(), 1);
        assert_eq!(nodes.total(), 4);
    }

    #[tokio::test]
    async fn ignores_other_clusters_and_untagged_nodes() {
        let provider = MemoryProvider::new();
        provider.seed_node("demo", Role::Master, InstanceState::Running);
        provider.seed_node("demo", Role::Worker, InstanceState::Running);
        provider.seed_node("other", Role::Worker, InstanceState::Running);
        provider.seed_untagged(InstanceState::Running);

        let nodes = find_cluster(&provider, "demo", DiscoveryMode::Strict)
            .await
            .unwrap();
        assert_eq!(nodes.total(), 2);
    }

    #[tokio::test]
    async fn terminated_nodes_are_invisible() {
        let provider = MemoryProvider::new();
        provider.seed_node("demo", Role::Master, InstanceState::Terminated);
        provider.seed_node("demo", Role::Worker, InstanceState::ShuttingDown);
        // Stopped clusters remain visible: they can be restarted.
        provider.seed_node("demo", Role::Worker, InstanceState::Stopped);

        let nodes = find_cluster(&provider, "demo", DiscoveryMode::Permissive)
            .await
            .unwrap();
        assert!(nodes.masters.is_empty());
        assert_eq!(nodes.workers.len(), 1);
    }

    #[tokio::test]
    async fn strict_mode_requires_masters_and_workers() {
        let provider = MemoryProvider::new();
        provider.seed_node("demo", Role::Worker, InstanceState::Running);

        let err = find_cluster(&provider, "demo", DiscoveryMode::Strict)
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::NoMasters(_)));

        let provider = MemoryProvider::new();
        provider.seed_node("demo", Role::Master, InstanceState::Running);
        let err = find_cluster(&provider, "demo", DiscoveryMode::Strict)
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::NoWorkers(_)));
    }

    #[tokio::test]
    async fn permissive_mode_accepts_empty_result() {
        let provider = MemoryProvider::new();
        let nodes = find_cluster(&provider, "demo", DiscoveryMode::Permissive)
            .await
            .unwrap();
        assert!(nodes.is_empty());
    }

    #[tokio::test]
    async fn discovery_is_idempotent() {
        let provider = MemoryProvider::new();
        provider.seed_node("demo", Role::Master, InstanceState::Running);
        provider.seed_node("demo", Role::Worker, InstanceState::Running);
        provider.seed_node("demo", Role::Worker, InstanceState::Running);

        let first = find_cluster(&provider, "demo", DiscoveryMode::Strict)
            .await
            .unwrap();
        let second = find_cluster(&provider, "demo", DiscoveryMode::Strict)
            .await
            .unwrap();

        let ids = |nodes: &ClusterNodes| -> Vec<String> {
            nodes.all().map(|i| i.id.clone()).collect()
        };
        assert_eq!(ids(&first), ids(&second));
    }
}
