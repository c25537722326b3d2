//! EC2 implementation of the provider boundary.
//!
//! A thin adapter over `aws-sdk-ec2`. All SDK errors are flattened into
//! [`ProviderError::Api`]; the orchestrator treats every provider
//! failure the same way regardless of the underlying service code.

use aws_config::BehaviorVersion;
use aws_sdk_ec2::Client;
use aws_sdk_ec2::config::Region;
use aws_sdk_ec2::types as sdk;
use tracing::debug;

use crate::api::CloudProvider;
use crate::error::{ProviderError, ProviderResult};
use crate::types::*;

/// Provider backed by the EC2 API in a single region.
#[derive(Clone)]
pub struct Ec2Provider {
    client: Client,
}

impl Ec2Provider {
    /// Connect to a region using the default credential chain.
    pub async fn connect(region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        debug!(%region, "connected to EC2");
        Ec2Provider {
            client: Client::new(&config),
        }
    }
}

fn api_err<E: std::fmt::Display>(err: E) -> ProviderError {
    ProviderError::Api(err.to_string())
}

fn instance_from_sdk(instance: &sdk::Instance) -> Instance {
    // Unknown or missing states are treated as inactive.
    let state = instance
        .state()
        .and_then(|s| s.name())
        .and_then(|n| InstanceState::parse(n.as_str()))
        .unwrap_or(InstanceState::ShuttingDown);
    let tags = instance
        .tags()
        .iter()
        .filter_map(|t| Some((t.key()?.to_string(), t.value()?.to_string())))
        .collect();
    Instance {
        id: instance.instance_id().unwrap_or_default().to_string(),
        public_dns: instance.public_dns_name().unwrap_or_default().to_string(),
        state,
        tags,
    }
}

/// Flatten one SDK permission into per-grant ingress rules, matching the
/// rule-by-rule, grant-by-grant shape teardown revokes in.
fn rules_from_permission(permission: &sdk::IpPermission) -> Vec<IngressRule> {
    let protocol = permission.ip_protocol().unwrap_or("-1").to_string();
    let from_port = permission
        .from_port()
        .and_then(|p| u16::try_from(p).ok())
        .unwrap_or(0);
    let to_port = permission
        .to_port()
        .and_then(|p| u16::try_from(p).ok())
        .unwrap_or(0);

    let mut rules = Vec::new();
    for range in permission.ip_ranges() {
        if let Some(cidr) = range.cidr_ip() {
            rules.push(IngressRule {
                protocol: protocol.clone(),
                from_port,
                to_port,
                source: RuleSource::Cidr(cidr.to_string()),
            });
        }
    }
    for pair in permission.user_id_group_pairs() {
        if let Some(group) = pair.group_name() {
            rules.push(IngressRule {
                protocol: protocol.clone(),
                from_port,
                to_port,
                source: RuleSource::Group(group.to_string()),
            });
        }
    }
    rules
}

fn group_from_sdk(group: &sdk::SecurityGroup) -> SecurityGroup {
    SecurityGroup {
        name: group.group_name().unwrap_or_default().to_string(),
        rules: group
            .ip_permissions()
            .iter()
            .flat_map(rules_from_permission)
            .collect(),
    }
}

fn permission_from_rule(rule: &IngressRule) -> sdk::IpPermission {
    let mut builder = sdk::IpPermission::builder().ip_protocol(&rule.protocol);
    // Protocol "-1" covers all ports; the API rejects port fields there.
    if rule.protocol != "-1" {
        builder = builder
            .from_port(rule.from_port as i32)
            .to_port(rule.to_port as i32);
    }
    match &rule.source {
        RuleSource::Cidr(cidr) => {
            builder = builder.ip_ranges(sdk::IpRange::builder().cidr_ip(cidr).build());
        }
        RuleSource::Group(group) => {
            builder = builder.user_id_group_pairs(
                sdk::UserIdGroupPair::builder().group_name(group).build(),
            );
        }
    }
    builder.build()
}

fn spot_from_sdk(request: &sdk::SpotInstanceRequest) -> SpotRequest {
    let state = match request.state().map(|s| s.as_str()) {
        Some("open") => SpotRequestState::Open,
        Some("active") => SpotRequestState::Active,
        Some("cancelled") => SpotRequestState::Cancelled,
        Some("closed") => SpotRequestState::Closed,
        _ => SpotRequestState::Failed,
    };
    SpotRequest {
        id: request
            .spot_instance_request_id()
            .unwrap_or_default()
            .to_string(),
        state,
        instance_id: request.instance_id().map(str::to_string),
    }
}

fn block_device_mapping(device: &BlockDevice) -> sdk::BlockDeviceMapping {
    sdk::BlockDeviceMapping::builder()
        .device_name(&device.device_name)
        .ebs(
            sdk::EbsBlockDevice::builder()
                .volume_size(device.volume_size_gb as i32)
                .delete_on_termination(device.delete_on_termination)
                .build(),
        )
        .build()
}

impl CloudProvider for Ec2Provider {
    async fn list_instances(&self) -> ProviderResult<Vec<Instance>> {
        let mut instances = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut request = self.client.describe_instances();
            if let Some(t) = &token {
                request = request.next_token(t);
            }
            let output = request.send().await.map_err(api_err)?;
            for reservation in output.reservations() {
                for instance in reservation.instances() {
                    instances.push(instance_from_sdk(instance));
                }
            }
            token = output.next_token().map(str::to_string);
            if token.is_none() {
                break;
            }
        }
        Ok(instances)
    }

    async fn describe_instances(&self, ids: &[String]) -> ProviderResult<Vec<Instance>> {
        let output = self
            .client
            .describe_instances()
            .set_instance_ids(Some(ids.to_vec()))
            .send()
            .await
            .map_err(api_err)?;
        let mut instances = Vec::new();
        for reservation in output.reservations() {
            for instance in reservation.instances() {
                instances.push(instance_from_sdk(instance));
            }
        }
        Ok(instances)
    }

    async fn list_security_groups(&self) -> ProviderResult<Vec<SecurityGroup>> {
        let output = self
            .client
            .describe_security_groups()
            .send()
            .await
            .map_err(api_err)?;
        Ok(output.security_groups().iter().map(group_from_sdk).collect())
    }

    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
    ) -> ProviderResult<SecurityGroup> {
        self.client
            .create_security_group()
            .group_name(name)
            .description(description)
            .send()
            .await
            .map_err(api_err)?;
        Ok(SecurityGroup {
            name: name.to_string(),
            rules: Vec::new(),
        })
    }

    async fn authorize_ingress(&self, group: &str, rule: &IngressRule) -> ProviderResult<()> {
        self.client
            .authorize_security_group_ingress()
            .group_name(group)
            .ip_permissions(permission_from_rule(rule))
            .send()
            .await
            .map_err(api_err)?;
        Ok(())
    }

    async fn revoke_ingress(&self, group: &str, rule: &IngressRule) -> ProviderResult<()> {
        self.client
            .revoke_security_group_ingress()
            .group_name(group)
            .ip_permissions(permission_from_rule(rule))
            .send()
            .await
            .map_err(api_err)?;
        Ok(())
    }

    async fn delete_security_group(&self, name: &str) -> ProviderResult<()> {
        self.client
            .delete_security_group()
            .group_name(name)
            .send()
            .await
            .map_err(api_err)?;
        Ok(())
    }

    async fn run_instances(&self, request: &LaunchRequest) -> ProviderResult<Vec<Instance>> {
        let mut call = self
            .client
            .run_instances()
            .image_id(&request.image_id)
            .min_count(request.count as i32)
            .max_count(request.count as i32)
            .instance_type(sdk::InstanceType::from(request.instance_type.as_str()))
            .security_groups(&request.security_group)
            .placement(
                sdk::Placement::builder()
                    .availability_zone(&request.zone)
                    .build(),
            );
        if let Some(key) = &request.key_pair {
            call = call.key_name(key);
        }
        if let Some(device) = &request.block_device {
            call = call.block_device_mappings(block_device_mapping(device));
        }
        let output = call.send().await.map_err(api_err)?;
        Ok(output.instances().iter().map(instance_from_sdk).collect())
    }

    async fn request_spot_instances(&self, bid: &SpotBid) -> ProviderResult<Vec<SpotRequest>> {
        let mut spec = sdk::RequestSpotLaunchSpecification::builder()
            .image_id(&bid.image_id)
            .instance_type(sdk::InstanceType::from(bid.instance_type.as_str()))
            .security_groups(&bid.security_group)
            .placement(
                sdk::SpotPlacement::builder()
                    .availability_zone(&bid.zone)
                    .build(),
            );
        if let Some(key) = &bid.key_pair {
            spec = spec.key_name(key);
        }
        if let Some(device) = &bid.block_device {
            spec = spec.block_device_mappings(block_device_mapping(device));
        }
        let output = self
            .client
            .request_spot_instances()
            .spot_price(format!("{:.3}", bid.price))
            .instance_count(bid.count as i32)
            .launch_group(&bid.launch_group)
            .launch_specification(spec.build())
            .send()
            .await
            .map_err(api_err)?;
        Ok(output
            .spot_instance_requests()
            .iter()
            .map(spot_from_sdk)
            .collect())
    }

    async fn list_spot_requests(&self) -> ProviderResult<Vec<SpotRequest>> {
        let output = self
            .client
            .describe_spot_instance_requests()
            .send()
            .await
            .map_err(api_err)?;
        Ok(output
            .spot_instance_requests()
            .iter()
            .map(spot_from_sdk)
            .collect())
    }

    async fn cancel_spot_requests(&self, ids: &[String]) -> ProviderResult<()> {
        self.client
            .cancel_spot_instance_requests()
            .set_spot_instance_request_ids(Some(ids.to_vec()))
            .send()
            .await
            .map_err(api_err)?;
        Ok(())
    }

    async fn terminate_instances(&self, ids: &[String]) -> ProviderResult<()> {
        self.client
            .terminate_instances()
            .set_instance_ids(Some(ids.to_vec()))
            .send()
            .await
            .map_err(api_err)?;
        Ok(())
    }

    async fn stop_instances(&self, ids: &[String]) -> ProviderResult<()> {
        self.client
            .stop_instances()
            .set_instance_ids(Some(ids.to_vec()))
            .send()
            .await
            .map_err(api_err)?;
        Ok(())
    }

    async fn start_instances(&self, ids: &[String]) -> ProviderResult<()> {
        self.client
            .start_instances()
            .set_instance_ids(Some(ids.to_vec()))
            .send()
            .await
            .map_err(api_err)?;
        Ok(())
    }

    async fn create_tags(&self, ids: &[String], tags: &[(String, String)]) -> ProviderResult<()> {
        let mut call = self.client.create_tags().set_resources(Some(ids.to_vec()));
        for (key, value) in tags {
            call = call.tags(sdk::Tag::builder().key(key).value(value).build());
        }
        call.send().await.map_err(api_err)?;
        Ok(())
    }

    async fn list_zones(&self) -> ProviderResult<Vec<String>> {
        let output = self
            .client
            .describe_availability_zones()
            .send()
            .await
            .map_err(api_err)?;
        Ok(output
            .availability_zones()
            .iter()
            .filter_map(|z| z.zone_name().map(str::to_string))
            .collect())
    }

    async fn find_image(&self, image_id: &str) -> ProviderResult<String> {
        let output = self
            .client
            .describe_images()
            .image_ids(image_id)
            .send()
            .await
            .map_err(api_err)?;
        match output.images().first().and_then(|i| i.image_id()) {
            Some(id) => Ok(id.to_string()),
            None => Err(ProviderError::ImageNotFound(image_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_for_group_trust_omits_ports() {
        let rule = IngressRule::from_group("demo-workers");
        let permission = permission_from_rule(&rule);
        assert_eq!(permission.ip_protocol(), Some("-1"));
        assert_eq!(permission.from_port(), None);
        assert_eq!(permission.user_id_group_pairs().len(), 1);
    }

    #[test]
    fn permission_for_tcp_rule_carries_ports() {
        let rule = IngressRule::tcp(8080, 8081, "0.0.0.0/0");
        let permission = permission_from_rule(&rule);
        assert_eq!(permission.ip_protocol(), Some("tcp"));
        assert_eq!(permission.from_port(), Some(8080));
        assert_eq!(permission.to_port(), Some(8081));
        assert_eq!(permission.ip_ranges().len(), 1);
    }

    #[test]
    fn permission_round_trips_through_rule_flattening() {
        let rule = IngressRule::tcp(22, 22, "0.0.0.0/0");
        let rules = rules_from_permission(&permission_from_rule(&rule));
        assert_eq!(rules, vec![rule]);
    }
}
