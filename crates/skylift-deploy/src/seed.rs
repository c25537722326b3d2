//! Seeding training data into the cluster's ephemeral HDFS.
//!
//! Two sources: a pre-attached data volume on the lead node, or the
//! public training buckets pulled over distcp. The bucket variant
//! bounces the mapred daemons first and patches the S3 credentials
//! into the HDFS site config before copying.

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::info;

use crate::error::DeployResult;
use crate::remote::RemoteExec;

const HDFS_BIN: &str = "/root/ephemeral-hdfs/bin";
/// Pause after bouncing a mapred daemon.
const MAPRED_SETTLE: Duration = Duration::from_secs(10);

/// Source buckets for the S3 copy. The default names are sharded
/// across numbered replicas to spread transfer load.
#[derive(Debug, Clone)]
pub struct SeedBuckets {
    pub stats: String,
    pub small: String,
    pub features: String,
}

impl SeedBuckets {
    /// Resolve "default" bucket names to a randomly chosen replica.
    pub fn resolve(stats: &str, small: &str, features: &str) -> Self {
        let mut rng = rand::rng();
        let mut pick = |name: &str, base: &str| {
            if name == "default" {
                format!("{base}-0{}", rng.random_range(1..=8))
            } else {
                name.to_string()
            }
        };
        SeedBuckets {
            stats: pick(stats, "ampcamp-data/wikistats_20090505"),
            small: pick(small, "ampcamp-data/wikistats_20090505_restricted"),
            features: pick(features, "ampcamp-data/wikistats_featurized"),
        }
    }
}

/// S3 credentials for the seed copy, with a dedicated override pair
/// taking precedence over the ambient provider credentials.
pub fn s3_keys_from_env() -> Option<(String, String)> {
    let access = std::env::var("S3_AWS_ACCESS_KEY_ID")
        .or_else(|_| std::env::var("AWS_ACCESS_KEY_ID"))
        .ok()?;
    let secret = std::env::var("S3_AWS_SECRET_ACCESS_KEY")
        .or_else(|_| std::env::var("AWS_SECRET_ACCESS_KEY"))
        .ok()?;
    Some((access, secret))
}

/// Copy seed data from a local volume mounted on the lead node.
pub async fn copy_seed_data_from_volume<E: RemoteExec>(exec: &E, lead: &str) -> DeployResult<()> {
    info!(%lead, "copying pagecount data from the data volume");
    exec.run_command(
        lead,
        &format!("{HDFS_BIN}/hadoop fs -copyFromLocal /ampcamp-data/pagecounts /wiki/pagecounts"),
    )
    .await?;
    info!(%lead, "copying featurized data from the data volume");
    exec.run_command(
        lead,
        &format!("{HDFS_BIN}/hadoop fs -copyFromLocal /ampcamp-data/wikistats_featurized /"),
    )
    .await?;
    info!(%lead, "copying article data from the data volume");
    exec.run_command(
        lead,
        &format!("{HDFS_BIN}/hadoop fs -copyFromLocal /ampcamp-data/enwiki_txt /"),
    )
    .await?;
    Ok(())
}

/// Copy seed data from the S3 buckets via distcp on the lead node.
pub async fn copy_seed_data_from_s3<E: RemoteExec>(
    exec: &E,
    lead: &str,
    buckets: &SeedBuckets,
    access_key: &str,
    secret_key: &str,
) -> DeployResult<()> {
    // distcp needs a running mapred; bounce it to pick up fresh config.
    exec.run_command(lead, &format!("{HDFS_BIN}/stop-mapred.sh")).await?;
    sleep(MAPRED_SETTLE).await;
    exec.run_command(lead, &format!("{HDFS_BIN}/start-mapred.sh")).await?;
    sleep(MAPRED_SETTLE).await;

    set_s3_keys_in_hdfs(exec, lead, access_key, secret_key).await?;

    info!(%lead, bucket = %buckets.stats, "copying pagecount data from s3");
    exec.run_command(
        lead,
        &format!(
            "{HDFS_BIN}/hadoop distcp s3n://{} hdfs://`hostname`:9000/wiki/pagecounts",
            buckets.stats
        ),
    )
    .await?;
    info!(%lead, bucket = %buckets.small, "copying restricted data from s3");
    exec.run_command(
        lead,
        &format!(
            "{HDFS_BIN}/hadoop distcp s3n://{} hdfs://`hostname`:9000/wikistats_20090505-07_restricted",
            buckets.small
        ),
    )
    .await?;
    info!(%lead, bucket = %buckets.features, "copying featurized data from s3");
    exec.run_command(
        lead,
        &format!(
            "{HDFS_BIN}/hadoop distcp s3n://{} hdfs://`hostname`:9000/wikistats_featurized",
            buckets.features
        ),
    )
    .await?;
    Ok(())
}

/// Patch the S3 credentials into the ephemeral HDFS site config,
/// uncommenting the property block first.
async fn set_s3_keys_in_hdfs<E: RemoteExec>(
    exec: &E,
    lead: &str,
    access_key: &str,
    secret_key: &str,
) -> DeployResult<()> {
    exec.run_command(
        lead,
        "cd ephemeral-hdfs/conf; sed -i \"s/\\!-- p/p/g\" core-site.xml",
    )
    .await?;
    exec.run_command(
        lead,
        "cd ephemeral-hdfs/conf; sed -i \"s/y --/y/g\" core-site.xml",
    )
    .await?;
    exec.run_command(
        lead,
        &format!(
            "cd ephemeral-hdfs/conf; sed -i \"/fs.s3n.awsAccessKeyId/{{N; s/value>.*<\\/value/value>{}<\\/value/g }}\" core-site.xml",
            access_key.replace('/', "\\/")
        ),
    )
    .await?;
    exec.run_command(
        lead,
        &format!(
            "cd ephemeral-hdfs/conf; sed -i \"/fs.s3n.awsSecretAccessKey/{{N; s/value>.*<\\/value/value>{}<\\/value/g }}\" core-site.xml",
            secret_key.replace('/', "\\/")
        ),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::RecordingExec;

    #[tokio::test]
    async fn volume_copy_issues_three_transfers() {
        let exec = RecordingExec::default();
        copy_seed_data_from_volume(&exec, "lead.example")
            .await
            .unwrap();
        let commands = exec.command_log();
        assert_eq!(commands.len(), 3);
        assert!(commands[0].ends_with("/wiki/pagecounts"));
        assert!(commands.iter().all(|c| c.contains("-copyFromLocal")));
    }

    #[tokio::test(start_paused = true)]
    async fn s3_copy_bounces_mapred_and_patches_keys() {
        let exec = RecordingExec::default();
        let buckets = SeedBuckets {
            stats: "data/stats-01".to_string(),
            small: "data/small-01".to_string(),
            features: "data/features-01".to_string(),
        };
        copy_seed_data_from_s3(&exec, "lead.example", &buckets, "AKIA/X", "secret")
            .await
            .unwrap();

        let commands = exec.command_log();
        assert!(commands[0].ends_with("stop-mapred.sh"));
        assert!(commands[1].ends_with("start-mapred.sh"));
        // Slash in the key is escaped for sed.
        assert!(commands.iter().any(|c| c.contains("AKIA\\/X")));
        let distcp: Vec<_> = commands.iter().filter(|c| c.contains("distcp")).collect();
        assert_eq!(distcp.len(), 3);
        assert!(distcp[0].contains("s3n://data/stats-01"));
    }

    #[test]
    fn default_buckets_resolve_to_a_replica() {
        let buckets = SeedBuckets::resolve("default", "custom/small", "default");
        assert!(buckets.stats.starts_with("ampcamp-data/wikistats_20090505-0"));
        let suffix = buckets.stats.chars().last().unwrap().to_digit(10).unwrap();
        assert!((1..=8).contains(&suffix));
        assert_eq!(buckets.small, "custom/small");
        assert!(
            buckets
                .features
                .starts_with("ampcamp-data/wikistats_featurized-0")
        );
    }
}
