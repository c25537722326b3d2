//! Idempotent security-group provisioning.
//!
//! One group per role. A group's rule set is authorized only while the
//! set is empty at the moment of check, which keeps repeated launches
//! from accumulating duplicate rules. The check-then-act is not atomic
//! against a concurrent launch of the same cluster name; that race is
//! accepted — the tool assumes a single operator per cluster.

use tracing::{debug, info};

use skylift_provider::{CloudProvider, IngressRule, ProviderResult, Role, SecurityGroup};

use crate::error::ClusterResult;

const GROUP_DESCRIPTION: &str = "skylift cluster group";

/// CIDR granted SSH and service-port access.
const PUBLIC: &str = "0.0.0.0/0";

/// The ingress rule set for one role's group.
///
/// Every role gets full intra-cluster trust from all three role groups
/// plus public SSH; the service ports differ per role.
pub fn role_rules(role: Role, cluster: &str, monitoring: bool) -> Vec<IngressRule> {
    let mut rules: Vec<IngressRule> = Role::ALL
        .iter()
        .map(|peer| IngressRule::from_group(&peer.group_name(cluster)))
        .collect();
    rules.push(IngressRule::tcp(22, 22, PUBLIC));

    let service_ports: &[(u16, u16)] = match role {
        Role::Master => &[
            (8080, 8081),
            (50030, 50030),
            (50070, 50070),
            (60070, 60070),
            (33000, 33010),
            (3030, 3040),
            (5050, 5050),
            (38090, 38090),
        ],
        Role::Worker => &[
            (8080, 8081),
            (50060, 50060),
            (50075, 50075),
            (60060, 60060),
            (60075, 60075),
            (5051, 5051),
        ],
        Role::Coordinator => &[(2181, 2181), (2888, 2888), (3888, 3888)],
    };
    for &(from, to) in service_ports {
        rules.push(IngressRule::tcp(from, to, PUBLIC));
    }
    if monitoring && role == Role::Master {
        rules.push(IngressRule::tcp(5080, 5080, PUBLIC));
    }
    rules
}

async fn get_or_create_group<P: CloudProvider>(
    provider: &P,
    name: &str,
) -> ProviderResult<SecurityGroup> {
    let groups = provider.list_security_groups().await?;
    if let Some(group) = groups.into_iter().find(|g| g.name == name) {
        return Ok(group);
    }
    info!(%name, "creating security group");
    provider.create_security_group(name, GROUP_DESCRIPTION).await
}

/// Fetch-or-create the three role groups and authorize each rule set
/// exactly once per group lifetime.
pub async fn ensure_security_groups<P: CloudProvider>(
    provider: &P,
    cluster: &str,
    monitoring: bool,
) -> ClusterResult<()> {
    info!(%cluster, "setting up security groups");
    for role in Role::ALL {
        let name = role.group_name(cluster);
        let group = get_or_create_group(provider, &name).await?;
        if group.rules.is_empty() {
            // Empty rule set means freshly created (or never configured):
            // the only state in which rules are authorized.
            for rule in role_rules(role, cluster, monitoring) {
                provider.authorize_ingress(&name, &rule).await?;
            }
            info!(group = %name, "authorized ingress rules");
        } else {
            debug!(group = %name, rules = group.rules.len(), "group already configured");
        }
    }
    Ok(())
}
