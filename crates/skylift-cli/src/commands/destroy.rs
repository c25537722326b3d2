use anyhow::bail;

use skylift_cluster::{GroupDeleteOutcome, delete_security_groups, terminate_cluster};
use skylift_provider::Ec2Provider;

use crate::ConnectArgs;
use crate::confirm::confirm;

pub async fn destroy(
    cluster: &str,
    connect: &ConnectArgs,
    delete_groups: bool,
    yes: bool,
) -> anyhow::Result<()> {
    if !yes {
        let confirmed = confirm(
            &format!(
                "Are you sure you want to destroy the cluster {cluster}?\n\
                 ALL DATA ON ALL NODES WILL BE LOST!!"
            ),
            &format!("Destroy cluster {cluster}"),
        )?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let provider = Ec2Provider::connect(&connect.region).await;
    let terminated = terminate_cluster(&provider, cluster).await?;
    println!("Terminated {terminated} instances.");

    if delete_groups {
        match delete_security_groups(&provider, cluster).await? {
            GroupDeleteOutcome::Deleted => println!("Deleted security groups."),
            GroupDeleteOutcome::RetryLater => {
                bail!(
                    "could not delete security groups; the instances may still be \
                     winding down, try again in a few minutes"
                );
            }
        }
    }
    Ok(())
}
