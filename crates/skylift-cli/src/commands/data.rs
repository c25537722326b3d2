use anyhow::{Context, bail};

use skylift_cluster::{DiscoveryMode, find_cluster};
use skylift_deploy::{
    SeedBuckets, SshExec, copy_seed_data_from_s3, copy_seed_data_from_volume, s3_keys_from_env,
};
use skylift_health::{HttpStatusProbe, expected_cores, wait_until_converged};
use skylift_provider::Ec2Provider;

use crate::{AccessArgs, BucketArgs, ConnectArgs};

pub async fn get_master(cluster: &str, connect: &ConnectArgs) -> anyhow::Result<()> {
    let provider = Ec2Provider::connect(&connect.region).await;
    let nodes = find_cluster(&provider, cluster, DiscoveryMode::Strict).await?;
    println!(
        "{}",
        nodes.lead().context("cluster has no master")?.public_dns
    );
    Ok(())
}

pub async fn copy_data(
    cluster: &str,
    connect: &ConnectArgs,
    access: &AccessArgs,
    instance_type: &str,
    from_s3: bool,
    buckets: &BucketArgs,
) -> anyhow::Result<()> {
    let provider = Ec2Provider::connect(&connect.region).await;
    let nodes = find_cluster(&provider, cluster, DiscoveryMode::Strict).await?;
    let lead = nodes
        .lead()
        .context("cluster has no master")?
        .public_dns
        .clone();
    let exec = SshExec::new(&access.user, &access.identity_file);

    // The copy needs a working HDFS underneath it.
    println!("Waiting for cluster to start...");
    let expected = expected_cores(instance_type, nodes.workers.len() as u32);
    let outcome = wait_until_converged(&HttpStatusProbe, &exec, &lead, expected).await?;
    if !outcome.is_converged() {
        bail!("cluster health check failed; not copying data");
    }

    if from_s3 {
        let (access_key, secret_key) =
            s3_keys_from_env().context("no S3 credentials in the environment")?;
        let resolved = SeedBuckets::resolve(
            &buckets.s3_stats_bucket,
            &buckets.s3_small_bucket,
            &buckets.s3_features_bucket,
        );
        copy_seed_data_from_s3(&exec, &lead, &resolved, &access_key, &secret_key).await?;
    } else {
        copy_seed_data_from_volume(&exec, &lead).await?;
    }
    println!("Done.");
    Ok(())
}
