//! Capacity acquisition — on-demand and spot paths.
//!
//! A launch provisions security groups, verifies the cluster name is
//! unused, acquires workers (immediately or via price bids), acquires
//! the master on-demand, then converges: wait out pending states, let
//! the provider settle, stamp the (cluster, role) tags, and rediscover
//! the finished cluster from those tags.
//!
//! The spot path is the only place with an interrupt handler: an
//! operator abort mid-wait cancels the whole bid batch so a partial
//! price-drop grant does not leave orphaned requests behind.

use std::future::Future;
use std::time::Duration;

use rand::seq::IndexedRandom;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use skylift_provider::{
    BlockDevice, CloudProvider, Instance, LaunchRequest, Role, SpotBid, SpotRequestState,
    TAG_CLUSTER, TAG_ROLE,
};

use crate::discovery::{ClusterNodes, DiscoveryMode, find_cluster};
use crate::error::{ClusterError, ClusterResult};
use crate::groups::ensure_security_groups;
use crate::partition::partition;

/// Interval between spot-grant polls.
const SPOT_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Interval between pending-state polls.
const PENDING_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Settle delay before tagging: confirmed instances can reject tag
/// writes immediately after creation.
const TAG_SETTLE_DELAY: Duration = Duration::from_secs(20);
/// Device name for the optional extra volume.
const EBS_DEVICE_NAME: &str = "/dev/sdv";

/// Where capacity is placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZonePolicy {
    /// One zone, chosen uniformly at random.
    Any,
    /// Spread workers across every zone in the region.
    All,
    /// A specific zone.
    Named(String),
}

/// Immutable launch configuration, built once at the CLI boundary.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub workers: u32,
    pub instance_type: String,
    /// Master instance type; defaults to the worker type.
    pub master_instance_type: Option<String>,
    pub zone: ZonePolicy,
    /// Concrete image id ("latest" is resolved before this is built).
    pub image_id: String,
    pub key_pair: Option<String>,
    /// Bid ceiling in dollars; `Some` selects the spot path.
    pub spot_price: Option<f64>,
    /// Extra volume size; 0 attaches nothing.
    pub ebs_vol_size_gb: u32,
    pub monitoring: bool,
    /// Extra settle time after instances report running.
    pub wait_secs: u64,
}

impl LaunchOptions {
    fn master_type(&self) -> &str {
        self.master_instance_type
            .as_deref()
            .unwrap_or(&self.instance_type)
    }

    fn block_device(&self) -> Option<BlockDevice> {
        (self.ebs_vol_size_gb > 0).then(|| BlockDevice {
            device_name: EBS_DEVICE_NAME.to_string(),
            volume_size_gb: self.ebs_vol_size_gb,
            delete_on_termination: true,
        })
    }
}

/// How a launch ended.
#[derive(Debug)]
pub enum LaunchOutcome {
    /// The full cluster is up, tagged, and rediscovered.
    Launched(ClusterNodes),
    /// The operator aborted the spot wait; the bid batch was cancelled.
    /// Instances granted before cancellation are reported, not reaped.
    Interrupted { still_running: usize },
}

/// The launch-group identifier shared by one invocation's spot bids.
pub fn launch_group(cluster: &str) -> String {
    format!("launch-group-{cluster}")
}

/// Launch a new cluster under `cluster`.
///
/// `interrupt` resolves when the operator aborts; it is only consulted
/// during the spot wait. Fails if any active node already carries this
/// cluster name.
pub async fn launch_cluster<P, F>(
    provider: &P,
    cluster: &str,
    opts: &LaunchOptions,
    interrupt: F,
) -> ClusterResult<LaunchOutcome>
where
    P: CloudProvider,
    F: Future<Output = ()>,
{
    ensure_security_groups(provider, cluster, opts.monitoring).await?;

    let existing = find_cluster(provider, cluster, DiscoveryMode::Permissive).await?;
    if !existing.is_empty() {
        return Err(ClusterError::AlreadyRunning {
            name: cluster.to_string(),
            count: existing.total(),
        });
    }

    let image_id = provider.find_image(&opts.image_id).await?;

    let all_zones = provider.list_zones().await?;
    if all_zones.is_empty() {
        return Err(ClusterError::NoZones);
    }
    let (worker_zones, master_zone) = match &opts.zone {
        ZonePolicy::Named(zone) => (vec![zone.clone()], zone.clone()),
        ZonePolicy::Any => {
            let zone = pick_zone(&all_zones)?;
            (vec![zone.clone()], zone)
        }
        ZonePolicy::All => (all_zones.clone(), pick_zone(&all_zones)?),
    };

    info!(count = opts.workers, "launching workers");
    let workers = if let Some(price) = opts.spot_price {
        let request_ids =
            submit_spot_bids(provider, cluster, opts, &image_id, &worker_zones, price).await?;
        info!("waiting for spot requests to be granted");
        tokio::select! {
            granted = wait_for_spot_grants(provider, &request_ids, opts.workers) => granted?,
            _ = interrupt => {
                warn!("interrupted, cancelling spot requests");
                provider.cancel_spot_requests(&request_ids).await?;
                let nodes = find_cluster(provider, cluster, DiscoveryMode::Permissive).await?;
                let still_running = nodes.total();
                if still_running > 0 {
                    warn!(count = still_running, "granted instances are still running");
                }
                return Ok(LaunchOutcome::Interrupted { still_running });
            }
        }
    } else {
        launch_on_demand_workers(provider, cluster, opts, &image_id, &worker_zones).await?
    };

    let master_request = LaunchRequest {
        image_id,
        count: 1,
        instance_type: opts.master_type().to_string(),
        zone: master_zone.clone(),
        key_pair: opts.key_pair.clone(),
        security_group: Role::Master.group_name(cluster),
        block_device: opts.block_device(),
    };
    let masters = provider.run_instances(&master_request).await?;
    info!(zone = %master_zone, "launched master");

    let worker_ids: Vec<String> = workers.iter().map(|i| i.id.clone()).collect();
    let master_ids: Vec<String> = masters.iter().map(|i| i.id.clone()).collect();
    let mut all_ids = worker_ids.clone();
    all_ids.extend(master_ids.iter().cloned());

    wait_for_running(provider, &all_ids).await?;
    sleep(TAG_SETTLE_DELAY).await;

    // Tag writes are not retried: a failure here is fatal.
    tag_role(provider, cluster, Role::Worker, &worker_ids).await?;
    tag_role(provider, cluster, Role::Master, &master_ids).await?;
    info!(%cluster, nodes = all_ids.len(), "tagged cluster nodes");

    if opts.wait_secs > 0 {
        info!(secs = opts.wait_secs, "waiting for nodes to finish booting");
        sleep(Duration::from_secs(opts.wait_secs)).await;
    }

    let nodes = find_cluster(provider, cluster, DiscoveryMode::Strict).await?;
    Ok(LaunchOutcome::Launched(nodes))
}

fn pick_zone(zones: &[String]) -> ClusterResult<String> {
    zones
        .choose(&mut rand::rng())
        .cloned()
        .ok_or(ClusterError::NoZones)
}

async fn launch_on_demand_workers<P: CloudProvider>(
    provider: &P,
    cluster: &str,
    opts: &LaunchOptions,
    image_id: &str,
    zones: &[String],
) -> ClusterResult<Vec<Instance>> {
    let mut workers = Vec::new();
    for (index, zone) in zones.iter().enumerate() {
        let count = partition(opts.workers, zones.len() as u32, index as u32);
        if count == 0 {
            continue;
        }
        let request = LaunchRequest {
            image_id: image_id.to_string(),
            count,
            instance_type: opts.instance_type.clone(),
            zone: zone.clone(),
            key_pair: opts.key_pair.clone(),
            security_group: Role::Worker.group_name(cluster),
            block_device: opts.block_device(),
        };
        let launched = provider.run_instances(&request).await?;
        info!(count, %zone, "launched workers");
        workers.extend(launched);
    }
    Ok(workers)
}

async fn submit_spot_bids<P: CloudProvider>(
    provider: &P,
    cluster: &str,
    opts: &LaunchOptions,
    image_id: &str,
    zones: &[String],
    price: f64,
) -> ClusterResult<Vec<String>> {
    info!(count = opts.workers, price, "requesting workers as spot instances");
    let mut request_ids = Vec::new();
    for (index, zone) in zones.iter().enumerate() {
        let count = partition(opts.workers, zones.len() as u32, index as u32);
        if count == 0 {
            continue;
        }
        let bid = SpotBid {
            price,
            launch_group: launch_group(cluster),
            image_id: image_id.to_string(),
            count,
            instance_type: opts.instance_type.clone(),
            zone: zone.clone(),
            key_pair: opts.key_pair.clone(),
            security_group: Role::Worker.group_name(cluster),
            block_device: opts.block_device(),
        };
        let requests = provider.request_spot_instances(&bid).await?;
        debug!(count, %zone, "submitted spot bids");
        request_ids.extend(requests.into_iter().map(|r| r.id));
    }
    Ok(request_ids)
}

/// Poll until every request in this batch is active with an instance.
///
/// There is no retry-with-higher-price and no timeout: a stalled bid
/// waits until the operator intervenes.
async fn wait_for_spot_grants<P: CloudProvider>(
    provider: &P,
    request_ids: &[String],
    total: u32,
) -> ClusterResult<Vec<Instance>> {
    loop {
        sleep(SPOT_POLL_INTERVAL).await;
        let requests = provider.list_spot_requests().await?;
        let granted: Vec<String> = requests
            .iter()
            .filter(|r| request_ids.contains(&r.id) && r.state == SpotRequestState::Active)
            .filter_map(|r| r.instance_id.clone())
            .collect();
        if granted.len() as u32 >= total {
            info!(count = granted.len(), "all spot requests granted");
            return Ok(provider.describe_instances(&granted).await?);
        }
        info!(granted = granted.len(), total, "spot requests granted so far, waiting");
    }
}

/// Poll until no instance in the batch is still pending.
async fn wait_for_running<P: CloudProvider>(provider: &P, ids: &[String]) -> ClusterResult<()> {
    info!("waiting for instances to start");
    loop {
        let instances = provider.describe_instances(ids).await?;
        let pending = instances
            .iter()
            .filter(|i| i.state == skylift_provider::InstanceState::Pending)
            .count();
        if pending == 0 {
            return Ok(());
        }
        debug!(pending, "instances still pending");
        sleep(PENDING_POLL_INTERVAL).await;
    }
}

async fn tag_role<P: CloudProvider>(
    provider: &P,
    cluster: &str,
    role: Role,
    ids: &[String],
) -> ClusterResult<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let tags = [
        (TAG_CLUSTER.to_string(), cluster.to_string()),
        (TAG_ROLE.to_string(), role.tag_value().to_string()),
    ];
    provider.create_tags(ids, &tags).await?;
    Ok(())
}
