//! In-memory provider fake.
//!
//! Backs the orchestrator's tests. Besides plain bookkeeping it can
//! script the provider's awkward behaviors: instances that stay pending
//! for a few polls, spot requests granted only after repeated reads, and
//! group deletions that fail until eventual consistency catches up. It
//! also counts authorize / terminate / cancel calls so tests can assert
//! idempotency properties.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{ProviderError, ProviderResult};
use crate::types::*;

#[derive(Default)]
struct Inner {
    instances: Vec<Instance>,
    /// Instance id → describe calls left until it leaves pending.
    pending_countdown: HashMap<String, u32>,
    groups: Vec<SecurityGroup>,
    spot: Vec<SpotRequest>,
    /// List calls left until open spot requests are granted. None means
    /// requests are never granted on their own.
    spot_grant_countdown: Option<u32>,
    zones: Vec<String>,
    images: Vec<String>,
    /// Pending-poll count applied to newly launched instances.
    launch_pending_polls: u32,
    /// Group delete calls that fail before deletes start succeeding.
    delete_failures: u32,
    next_instance: u32,
    next_spot: u32,
    authorize_calls: HashMap<String, u32>,
    terminate_calls: u32,
    stop_calls: u32,
    start_calls: u32,
    cancel_calls: HashMap<String, u32>,
}

/// Shared-handle in-memory provider.
#[derive(Clone, Default)]
pub struct MemoryProvider {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryProvider {
    /// A provider with three zones and one known image.
    pub fn new() -> Self {
        let provider = MemoryProvider::default();
        {
            let mut inner = provider.lock();
            inner.zones = vec![
                "zone-a".to_string(),
                "zone-b".to_string(),
                "zone-c".to_string(),
            ];
            inner.images = vec!["img-0001".to_string()];
        }
        provider
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn with_zones(self, zones: &[&str]) -> Self {
        self.lock().zones = zones.iter().map(|z| z.to_string()).collect();
        self
    }

    pub fn add_image(&self, image_id: &str) {
        self.lock().images.push(image_id.to_string());
    }

    /// Newly launched instances stay pending for `polls` describe calls.
    pub fn set_launch_pending_polls(&self, polls: u32) {
        self.lock().launch_pending_polls = polls;
    }

    /// Grant all open spot requests after `polls` list calls.
    pub fn grant_spot_after(&self, polls: u32) {
        self.lock().spot_grant_countdown = Some(polls);
    }

    /// Fail the next `count` group delete calls.
    pub fn fail_group_deletes(&self, count: u32) {
        self.lock().delete_failures = count;
    }

    /// Seed a tagged cluster node, returning its id.
    pub fn seed_node(&self, cluster: &str, role: Role, state: InstanceState) -> String {
        let mut inner = self.lock();
        let id = format!("i-{:04}", inner.next_instance);
        inner.next_instance += 1;
        let mut tags = HashMap::new();
        tags.insert(TAG_CLUSTER.to_string(), cluster.to_string());
        tags.insert(TAG_ROLE.to_string(), role.tag_value().to_string());
        inner.instances.push(Instance {
            id: id.clone(),
            public_dns: format!("{id}.node.internal"),
            state,
            tags,
        });
        id
    }

    /// Seed an untagged instance.
    pub fn seed_untagged(&self, state: InstanceState) -> String {
        let mut inner = self.lock();
        let id = format!("i-{:04}", inner.next_instance);
        inner.next_instance += 1;
        inner.instances.push(Instance {
            id: id.clone(),
            public_dns: format!("{id}.node.internal"),
            state,
            tags: HashMap::new(),
        });
        id
    }

    pub fn instance(&self, id: &str) -> Option<Instance> {
        self.lock().instances.iter().find(|i| i.id == id).cloned()
    }

    pub fn group(&self, name: &str) -> Option<SecurityGroup> {
        self.lock().groups.iter().find(|g| g.name == name).cloned()
    }

    pub fn authorize_count(&self, group: &str) -> u32 {
        self.lock().authorize_calls.get(group).copied().unwrap_or(0)
    }

    pub fn terminate_count(&self) -> u32 {
        self.lock().terminate_calls
    }

    pub fn stop_count(&self) -> u32 {
        self.lock().stop_calls
    }

    pub fn start_count(&self) -> u32 {
        self.lock().start_calls
    }

    pub fn cancel_count(&self, request_id: &str) -> u32 {
        self.lock()
            .cancel_calls
            .get(request_id)
            .copied()
            .unwrap_or(0)
    }
}

impl Inner {
    /// One describe tick: pending instances edge toward running.
    fn tick_pending(&mut self) {
        let mut now_running = Vec::new();
        for (id, left) in self.pending_countdown.iter_mut() {
            if *left <= 1 {
                now_running.push(id.clone());
            } else {
                *left -= 1;
            }
        }
        for id in now_running {
            self.pending_countdown.remove(&id);
            if let Some(instance) = self.instances.iter_mut().find(|i| i.id == id) {
                instance.state = InstanceState::Running;
            }
        }
    }

    fn launch(&mut self, count: u32, zone: &str) -> Vec<Instance> {
        let mut launched = Vec::new();
        for _ in 0..count {
            let id = format!("i-{:04}", self.next_instance);
            self.next_instance += 1;
            let state = if self.launch_pending_polls > 0 {
                self.pending_countdown
                    .insert(id.clone(), self.launch_pending_polls);
                InstanceState::Pending
            } else {
                InstanceState::Running
            };
            let instance = Instance {
                id: id.clone(),
                public_dns: format!("{id}.{zone}.node.internal"),
                state,
                tags: HashMap::new(),
            };
            self.instances.push(instance.clone());
            launched.push(instance);
        }
        launched
    }

    /// One spot-list tick: grant open requests when the countdown runs out.
    fn tick_spot(&mut self) {
        let Some(left) = self.spot_grant_countdown else {
            return;
        };
        if left > 0 {
            self.spot_grant_countdown = Some(left - 1);
            return;
        }
        let open: Vec<usize> = self
            .spot
            .iter()
            .enumerate()
            .filter(|(_, r)| r.state == SpotRequestState::Open)
            .map(|(idx, _)| idx)
            .collect();
        for idx in open {
            let granted = self.launch(1, "zone-a");
            self.spot[idx].state = SpotRequestState::Active;
            self.spot[idx].instance_id = Some(granted[0].id.clone());
        }
    }
}

impl CloudProvider for MemoryProvider {
    async fn list_instances(&self) -> ProviderResult<Vec<Instance>> {
        let mut inner = self.lock();
        inner.tick_pending();
        Ok(inner.instances.clone())
    }

    async fn describe_instances(&self, ids: &[String]) -> ProviderResult<Vec<Instance>> {
        let mut inner = self.lock();
        inner.tick_pending();
        let mut found = Vec::new();
        for id in ids {
            match inner.instances.iter().find(|i| &i.id == id) {
                Some(instance) => found.push(instance.clone()),
                None => return Err(ProviderError::InstanceNotFound(id.clone())),
            }
        }
        Ok(found)
    }

    async fn list_security_groups(&self) -> ProviderResult<Vec<SecurityGroup>> {
        Ok(self.lock().groups.clone())
    }

    async fn create_security_group(
        &self,
        name: &str,
        _description: &str,
    ) -> ProviderResult<SecurityGroup> {
        let mut inner = self.lock();
        if inner.groups.iter().any(|g| g.name == name) {
            return Err(ProviderError::Api(format!(
                "security group already exists: {name}"
            )));
        }
        let group = SecurityGroup {
            name: name.to_string(),
            rules: Vec::new(),
        };
        inner.groups.push(group.clone());
        Ok(group)
    }

    async fn authorize_ingress(&self, group: &str, rule: &IngressRule) -> ProviderResult<()> {
        let mut inner = self.lock();
        *inner.authorize_calls.entry(group.to_string()).or_insert(0) += 1;
        let entry = inner
            .groups
            .iter_mut()
            .find(|g| g.name == group)
            .ok_or_else(|| ProviderError::GroupNotFound(group.to_string()))?;
        entry.rules.push(rule.clone());
        Ok(())
    }

    async fn revoke_ingress(&self, group: &str, rule: &IngressRule) -> ProviderResult<()> {
        let mut inner = self.lock();
        let entry = inner
            .groups
            .iter_mut()
            .find(|g| g.name == group)
            .ok_or_else(|| ProviderError::GroupNotFound(group.to_string()))?;
        entry.rules.retain(|r| r != rule);
        Ok(())
    }

    async fn delete_security_group(&self, name: &str) -> ProviderResult<()> {
        let mut inner = self.lock();
        if inner.delete_failures > 0 {
            inner.delete_failures -= 1;
            return Err(ProviderError::Api(format!(
                "dependent object still references group {name}"
            )));
        }
        let before = inner.groups.len();
        inner.groups.retain(|g| g.name != name);
        if inner.groups.len() == before {
            return Err(ProviderError::GroupNotFound(name.to_string()));
        }
        Ok(())
    }

    async fn run_instances(&self, request: &LaunchRequest) -> ProviderResult<Vec<Instance>> {
        let mut inner = self.lock();
        if !inner.images.contains(&request.image_id) {
            return Err(ProviderError::ImageNotFound(request.image_id.clone()));
        }
        Ok(inner.launch(request.count, &request.zone))
    }

    async fn request_spot_instances(&self, bid: &SpotBid) -> ProviderResult<Vec<SpotRequest>> {
        let mut inner = self.lock();
        if !inner.images.contains(&bid.image_id) {
            return Err(ProviderError::ImageNotFound(bid.image_id.clone()));
        }
        let mut requests = Vec::new();
        for _ in 0..bid.count {
            let id = format!("sir-{:04}", inner.next_spot);
            inner.next_spot += 1;
            let request = SpotRequest {
                id,
                state: SpotRequestState::Open,
                instance_id: None,
            };
            inner.spot.push(request.clone());
            requests.push(request);
        }
        Ok(requests)
    }

    async fn list_spot_requests(&self) -> ProviderResult<Vec<SpotRequest>> {
        let mut inner = self.lock();
        inner.tick_spot();
        Ok(inner.spot.clone())
    }

    async fn cancel_spot_requests(&self, ids: &[String]) -> ProviderResult<()> {
        let mut inner = self.lock();
        for id in ids {
            *inner.cancel_calls.entry(id.clone()).or_insert(0) += 1;
            if let Some(request) = inner.spot.iter_mut().find(|r| &r.id == id) {
                if request.state == SpotRequestState::Open {
                    request.state = SpotRequestState::Cancelled;
                }
            }
        }
        Ok(())
    }

    async fn terminate_instances(&self, ids: &[String]) -> ProviderResult<()> {
        let mut inner = self.lock();
        inner.terminate_calls += ids.len() as u32;
        for id in ids {
            if let Some(instance) = inner.instances.iter_mut().find(|i| &i.id == id) {
                instance.state = InstanceState::Terminated;
            }
        }
        Ok(())
    }

    async fn stop_instances(&self, ids: &[String]) -> ProviderResult<()> {
        let mut inner = self.lock();
        inner.stop_calls += ids.len() as u32;
        for id in ids {
            if let Some(instance) = inner.instances.iter_mut().find(|i| &i.id == id) {
                instance.state = InstanceState::Stopped;
            }
        }
        Ok(())
    }

    async fn start_instances(&self, ids: &[String]) -> ProviderResult<()> {
        let mut inner = self.lock();
        inner.start_calls += ids.len() as u32;
        for id in ids {
            if let Some(instance) = inner.instances.iter_mut().find(|i| &i.id == id) {
                instance.state = InstanceState::Running;
            }
        }
        Ok(())
    }

    async fn create_tags(&self, ids: &[String], tags: &[(String, String)]) -> ProviderResult<()> {
        let mut inner = self.lock();
        for id in ids {
            let instance = inner
                .instances
                .iter_mut()
                .find(|i| &i.id == id)
                .ok_or_else(|| ProviderError::InstanceNotFound(id.clone()))?;
            for (key, value) in tags {
                instance.tags.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn list_zones(&self) -> ProviderResult<Vec<String>> {
        Ok(self.lock().zones.clone())
    }

    async fn find_image(&self, image_id: &str) -> ProviderResult<String> {
        let inner = self.lock();
        if inner.images.iter().any(|i| i == image_id) {
            Ok(image_id.to_string())
        } else {
            Err(ProviderError::ImageNotFound(image_id.to_string()))
        }
    }
}
