use anyhow::{Context, bail};
use tracing::info;

use skylift_cluster::{
    DiscoveryMode, LaunchOptions, LaunchOutcome, ZonePolicy, find_cluster, launch_cluster,
};
use skylift_deploy::{
    DeployConfig, SshExec, cluster_template_vars, copy_seed_data_from_volume, setup_cluster,
};
use skylift_health::{HealthOutcome, HttpStatusProbe, STATUS_PORT, expected_cores,
    wait_until_converged};
use skylift_provider::Ec2Provider;

use crate::{AccessArgs, ConnectArgs, LaunchArgs};

/// Pointer object naming the newest published machine image.
const LATEST_IMAGE_HOST: &str = "s3.amazonaws.com";
const LATEST_IMAGE_PATH: &str = "/ampcamp-amis/latest-ampcamp3";

pub async fn launch(
    cluster: &str,
    connect: &ConnectArgs,
    access: &AccessArgs,
    args: &LaunchArgs,
) -> anyhow::Result<()> {
    let provider = Ec2Provider::connect(&connect.region).await;

    let nodes = if args.resume {
        find_cluster(&provider, cluster, DiscoveryMode::Strict).await?
    } else {
        let image_id = if args.image == "latest" {
            let image = latest_image().await?;
            info!(%image, "resolved latest machine image");
            image
        } else {
            args.image.clone()
        };
        let opts = LaunchOptions {
            workers: args.workers,
            instance_type: args.instance_type.clone(),
            master_instance_type: args.master_instance_type.clone(),
            zone: zone_policy(args.zone.as_deref()),
            image_id,
            key_pair: args.key_pair.clone(),
            spot_price: args.spot_price,
            ebs_vol_size_gb: args.ebs_vol_size,
            monitoring: !args.no_monitoring,
            wait_secs: args.wait,
        };
        let interrupt = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        match launch_cluster(&provider, cluster, &opts, interrupt).await? {
            LaunchOutcome::Launched(nodes) => nodes,
            LaunchOutcome::Interrupted { still_running } => {
                return finish_interrupted(cluster, still_running);
            }
        }
    };

    let lead = nodes
        .lead()
        .context("cluster has no master to set up")?
        .public_dns
        .clone();

    let config = DeployConfig {
        instance_type: args.instance_type.clone(),
        swap_mb: args.swap,
        monitoring: !args.no_monitoring,
    };
    let vars = cluster_template_vars(&nodes, &config);
    let exec = SshExec::new(&access.user, &access.identity_file);
    setup_cluster(
        &exec,
        &lead,
        &args.template_dir,
        &vars,
        Some(&access.identity_file),
    )
    .await?;

    let expected = expected_cores(&args.instance_type, nodes.workers.len() as u32);
    let outcome = wait_until_converged(&HttpStatusProbe, &exec, &lead, expected).await?;
    if let HealthOutcome::Exhausted { expected, observed } = outcome {
        bail!("cluster health check failed: expected {expected} cores, saw {observed:?}");
    }

    if args.copy {
        copy_seed_data_from_volume(&exec, &lead).await?;
    }

    println!("Cluster {cluster} is up: http://{lead}:{STATUS_PORT}");
    Ok(())
}

/// An operator abort is a clean exit, not a failure: the bid batch is
/// already cancelled, and any instances granted before the abort are
/// reported so the operator can destroy them.
fn finish_interrupted(cluster: &str, still_running: usize) -> anyhow::Result<()> {
    if still_running > 0 {
        eprintln!(
            "Launch interrupted: {still_running} granted instances are still running \
             under cluster {cluster}; run destroy to reclaim them."
        );
    } else {
        eprintln!("Launch interrupted; all spot requests cancelled.");
    }
    Ok(())
}

fn zone_policy(zone: Option<&str>) -> ZonePolicy {
    match zone {
        None => ZonePolicy::Any,
        Some("all") => ZonePolicy::All,
        Some(zone) => ZonePolicy::Named(zone.to_string()),
    }
}

/// Fetch the image id the latest-image pointer names.
async fn latest_image() -> anyhow::Result<String> {
    let address = format!("{LATEST_IMAGE_HOST}:80");
    let stream = tokio::net::TcpStream::connect(&address)
        .await
        .with_context(|| format!("could not reach {LATEST_IMAGE_HOST}"))?;
    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let req = http::Request::builder()
        .method("GET")
        .uri(format!("http://{LATEST_IMAGE_HOST}{LATEST_IMAGE_PATH}"))
        .header("host", LATEST_IMAGE_HOST)
        .body(http_body_util::Empty::<bytes::Bytes>::new())?;
    let resp = sender.send_request(req).await?;
    if !resp.status().is_success() {
        bail!(
            "could not read latest image pointer: {}",
            resp.status()
        );
    }

    use http_body_util::BodyExt;
    let body = resp.into_body().collect().await?.to_bytes();
    let image = String::from_utf8_lossy(&body).trim().to_string();
    if image.is_empty() {
        bail!("latest image pointer is empty");
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_exits_cleanly() {
        assert!(finish_interrupted("demo", 0).is_ok());
        assert!(finish_interrupted("demo", 3).is_ok());
    }

    #[test]
    fn zone_flag_maps_to_policy() {
        assert!(matches!(zone_policy(None), ZonePolicy::Any));
        assert!(matches!(zone_policy(Some("all")), ZonePolicy::All));
        assert!(matches!(
            zone_policy(Some("zone-b")),
            ZonePolicy::Named(z) if z == "zone-b"
        ));
    }
}
