//! End-to-end launch flow against the in-memory provider.

use skylift_cluster::{
    DiscoveryMode, GroupDeleteOutcome, LaunchOptions, LaunchOutcome, ZonePolicy,
    delete_security_groups, find_cluster, launch_cluster, terminate_cluster,
};
use skylift_provider::{CloudProvider, InstanceState, MemoryProvider, Role};

fn on_demand_options(workers: u32) -> LaunchOptions {
    LaunchOptions {
        workers,
        instance_type: "m1.xlarge".to_string(),
        master_instance_type: None,
        zone: ZonePolicy::All,
        image_id: "img-0001".to_string(),
        key_pair: Some("ops".to_string()),
        spot_price: None,
        ebs_vol_size_gb: 0,
        monitoring: true,
        wait_secs: 120,
    }
}

async fn never() {
    std::future::pending::<()>().await;
}

#[tokio::test(start_paused = true)]
async fn launch_five_workers_across_two_zones() {
    let provider = MemoryProvider::new().with_zones(&["zone-a", "zone-b"]);

    let outcome = launch_cluster(&provider, "camp", &on_demand_options(5), never())
        .await
        .unwrap();
    let LaunchOutcome::Launched(nodes) = outcome else {
        panic!("expected a launched cluster");
    };

    // Exactly one master and five workers, all tagged with the name.
    assert_eq!(nodes.masters.len(), 1);
    assert_eq!(nodes.workers.len(), 5);
    assert!(nodes.coordinators.is_empty());
    for node in nodes.all() {
        assert_eq!(node.cluster(), Some("camp"));
        assert_eq!(node.state, InstanceState::Running);
    }

    // Group provisioning ran exactly once per role.
    for role in Role::ALL {
        let group = role.group_name("camp");
        let expected_rules = provider.group(&group).unwrap().rules.len() as u32;
        assert_eq!(provider.authorize_count(&group), expected_rules);
    }

    // Workers spread 3/2 over the two zones, by public DNS suffix.
    let in_zone = |zone: &str| {
        nodes
            .workers
            .iter()
            .filter(|i| i.public_dns.contains(zone))
            .count()
    };
    assert_eq!(in_zone("zone-a"), 3);
    assert_eq!(in_zone("zone-b"), 2);
}

#[tokio::test(start_paused = true)]
async fn relaunch_under_the_same_name_is_refused() {
    let provider = MemoryProvider::new().with_zones(&["zone-a", "zone-b"]);
    let opts = on_demand_options(2);

    launch_cluster(&provider, "camp", &opts, never()).await.unwrap();
    assert!(launch_cluster(&provider, "camp", &opts, never()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn full_lifecycle_launch_destroy_discover() {
    let provider = MemoryProvider::new().with_zones(&["zone-a"]);
    let opts = on_demand_options(3);

    launch_cluster(&provider, "camp", &opts, never()).await.unwrap();
    assert_eq!(terminate_cluster(&provider, "camp").await.unwrap(), 4);

    let gone = find_cluster(&provider, "camp", DiscoveryMode::Permissive)
        .await
        .unwrap();
    assert!(gone.is_empty());

    let outcome = delete_security_groups(&provider, "camp").await.unwrap();
    assert_eq!(outcome, GroupDeleteOutcome::Deleted);
    assert!(provider.list_security_groups().await.unwrap().is_empty());
}
