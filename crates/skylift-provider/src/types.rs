//! Domain types shared across the provider boundary.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag key carrying the cluster name.
pub const TAG_CLUSTER: &str = "cluster";
/// Tag key carrying the node role.
pub const TAG_ROLE: &str = "role";

/// Lifecycle state of a compute instance, as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceState {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
}

impl InstanceState {
    /// Whether the instance counts as part of a live cluster.
    ///
    /// Stopping and stopped instances are active — stopped clusters can
    /// be restarted. Shutting-down and terminated instances are invisible
    /// to discovery.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            InstanceState::Pending
                | InstanceState::Running
                | InstanceState::Stopping
                | InstanceState::Stopped
        )
    }

    /// Parse the provider's wire name for a state.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InstanceState::Pending),
            "running" => Some(InstanceState::Running),
            "stopping" => Some(InstanceState::Stopping),
            "stopped" => Some(InstanceState::Stopped),
            "shutting-down" => Some(InstanceState::ShuttingDown),
            "terminated" => Some(InstanceState::Terminated),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role a node plays within a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Coordinator,
    Master,
    Worker,
}

impl Role {
    /// All roles, in provisioning order.
    pub const ALL: [Role; 3] = [Role::Coordinator, Role::Master, Role::Worker];

    /// The value stored in the role tag.
    pub fn tag_value(self) -> &'static str {
        match self {
            Role::Coordinator => "coordinator",
            Role::Master => "master",
            Role::Worker => "worker",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "coordinator" => Some(Role::Coordinator),
            "master" => Some(Role::Master),
            "worker" => Some(Role::Worker),
            _ => None,
        }
    }

    /// Name of the security group holding this role's nodes.
    pub fn group_name(self, cluster: &str) -> String {
        match self {
            Role::Coordinator => format!("{cluster}-coordinator"),
            Role::Master => format!("{cluster}-master"),
            Role::Worker => format!("{cluster}-workers"),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag_value())
    }
}

/// A compute instance as seen through the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub id: String,
    /// Public DNS name; may be empty while the instance is pending.
    pub public_dns: String,
    pub state: InstanceState,
    pub tags: HashMap<String, String>,
}

impl Instance {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Cluster name from the cluster tag, if present.
    pub fn cluster(&self) -> Option<&str> {
        self.tag(TAG_CLUSTER)
    }

    /// Role from the role tag, if present and recognized.
    pub fn role(&self) -> Option<Role> {
        self.tag(TAG_ROLE).and_then(Role::parse)
    }
}

/// Source of an ingress grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    /// Traffic from members of a named security group.
    Group(String),
    /// Traffic from a CIDR block.
    Cidr(String),
}

/// A single ingress rule on a security group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
    /// IP protocol ("tcp", "udp", or "-1" for all).
    pub protocol: String,
    pub from_port: u16,
    pub to_port: u16,
    pub source: RuleSource,
}

impl IngressRule {
    /// Full trust from another security group, all protocols and ports.
    pub fn from_group(group: &str) -> Self {
        IngressRule {
            protocol: "-1".to_string(),
            from_port: 0,
            to_port: 0,
            source: RuleSource::Group(group.to_string()),
        }
    }

    /// TCP port range open to a CIDR block.
    pub fn tcp(from_port: u16, to_port: u16, cidr: &str) -> Self {
        IngressRule {
            protocol: "tcp".to_string(),
            from_port,
            to_port,
            source: RuleSource::Cidr(cidr.to_string()),
        }
    }
}

/// A named provider-side firewall object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroup {
    pub name: String,
    pub rules: Vec<IngressRule>,
}

/// State of a spot capacity request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotRequestState {
    Open,
    Active,
    Cancelled,
    Closed,
    Failed,
}

/// A price-bid capacity request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotRequest {
    pub id: String,
    pub state: SpotRequestState,
    /// Instance granted to this request, once active.
    pub instance_id: Option<String>,
}

/// A block device attached at launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    pub device_name: String,
    pub volume_size_gb: u32,
    pub delete_on_termination: bool,
}

/// An on-demand launch request for a single zone.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub image_id: String,
    pub count: u32,
    pub instance_type: String,
    pub zone: String,
    pub key_pair: Option<String>,
    pub security_group: String,
    pub block_device: Option<BlockDevice>,
}

/// A spot bid for a single zone.
///
/// Bids submitted together share a `launch_group` so a partial grant
/// can be cancelled as a unit.
#[derive(Debug, Clone)]
pub struct SpotBid {
    pub price: f64,
    pub launch_group: String,
    pub image_id: String,
    pub count: u32,
    pub instance_type: String,
    pub zone: String,
    pub key_pair: Option<String>,
    pub security_group: String,
    pub block_device: Option<BlockDevice>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_states() {
        assert!(InstanceState::Pending.is_active());
        assert!(InstanceState::Running.is_active());
        assert!(InstanceState::Stopping.is_active());
        assert!(InstanceState::Stopped.is_active());
        assert!(!InstanceState::ShuttingDown.is_active());
        assert!(!InstanceState::Terminated.is_active());
    }

    #[test]
    fn state_parse_round_trip() {
        for state in [
            InstanceState::Pending,
            InstanceState::Running,
            InstanceState::Stopping,
            InstanceState::Stopped,
            InstanceState::ShuttingDown,
            InstanceState::Terminated,
        ] {
            assert_eq!(InstanceState::parse(state.as_str()), Some(state));
        }
        assert_eq!(InstanceState::parse("rebooting"), None);
    }

    #[test]
    fn role_group_names() {
        assert_eq!(Role::Master.group_name("demo"), "demo-master");
        assert_eq!(Role::Worker.group_name("demo"), "demo-workers");
        assert_eq!(Role::Coordinator.group_name("demo"), "demo-coordinator");
    }

    #[test]
    fn instance_tag_lookup() {
        let mut tags = HashMap::new();
        tags.insert(TAG_CLUSTER.to_string(), "demo".to_string());
        tags.insert(TAG_ROLE.to_string(), "worker".to_string());
        let instance = Instance {
            id: "i-0001".to_string(),
            public_dns: "node-1.example".to_string(),
            state: InstanceState::Running,
            tags,
        };

        assert_eq!(instance.cluster(), Some("demo"));
        assert_eq!(instance.role(), Some(Role::Worker));
    }

    #[test]
    fn untagged_instance_has_no_role() {
        let instance = Instance {
            id: "i-0002".to_string(),
            public_dns: String::new(),
            state: InstanceState::Running,
            tags: HashMap::new(),
        };
        assert_eq!(instance.cluster(), None);
        assert_eq!(instance.role(), None);
    }
}
