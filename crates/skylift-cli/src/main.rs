use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

mod commands;
mod confirm;
mod credentials;

#[derive(Parser)]
#[command(
    name = "skylift",
    about = "Skylift — cluster launch and lifecycle orchestration on EC2",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Provider connection options shared by every subcommand.
#[derive(Args)]
struct ConnectArgs {
    /// EC2 region to operate in
    #[arg(short = 'r', long, default_value = "us-east-1")]
    region: String,
}

/// ssh access options for subcommands that reach into nodes.
#[derive(Args)]
struct AccessArgs {
    /// The ssh user to connect as
    #[arg(short = 'u', long, default_value = "root")]
    user: String,
    /// SSH private key file for logging into instances
    #[arg(short = 'i', long)]
    identity_file: PathBuf,
}

#[derive(Args)]
struct LaunchArgs {
    /// Number of workers to launch
    #[arg(short = 's', long, default_value_t = 5)]
    workers: u32,
    /// Seconds to wait for nodes to start
    #[arg(short = 'w', long, default_value_t = 120)]
    wait: u64,
    /// Key pair to use on instances
    #[arg(short = 'k', long)]
    key_pair: Option<String>,
    /// Type of instance to launch
    #[arg(short = 't', long, default_value = "m1.xlarge")]
    instance_type: String,
    /// Master instance type (defaults to --instance-type)
    #[arg(short = 'm', long)]
    master_instance_type: Option<String>,
    /// Availability zone to launch in, or 'all' to spread workers
    /// across every zone
    #[arg(short = 'z', long)]
    zone: Option<String>,
    /// Machine image ID to use, or 'latest' for the newest published
    /// image
    #[arg(short = 'a', long, default_value = "latest")]
    image: String,
    /// Resume setup on a previously launched cluster
    #[arg(long)]
    resume: bool,
    /// Attach a fresh EBS volume of this size (GB) to each node
    #[arg(long, value_name = "SIZE", default_value_t = 0)]
    ebs_vol_size: u32,
    /// Swap space to configure per node, in MB
    #[arg(long, default_value_t = 1024)]
    swap: u32,
    /// Launch workers as spot instances with this maximum price
    #[arg(long, value_name = "PRICE")]
    spot_price: Option<f64>,
    /// Skip ganglia monitoring setup
    #[arg(long)]
    no_monitoring: bool,
    /// Directory of configuration templates to deploy
    #[arg(long, default_value = "deploy.generic")]
    template_dir: PathBuf,
    /// Copy seed data from the attached data volume into HDFS after
    /// setup
    #[arg(long)]
    copy: bool,
}

#[derive(Args)]
struct BucketArgs {
    /// S3 bucket holding the pagecount data
    #[arg(long, default_value = "default")]
    s3_stats_bucket: String,
    /// S3 bucket holding the restricted data
    #[arg(long, default_value = "default")]
    s3_small_bucket: String,
    /// S3 bucket holding the featurized data
    #[arg(long, default_value = "default")]
    s3_features_bucket: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch a new cluster and run setup on it
    Launch {
        /// Name for the new cluster
        cluster: String,
        #[command(flatten)]
        connect: ConnectArgs,
        #[command(flatten)]
        access: AccessArgs,
        #[command(flatten)]
        launch: LaunchArgs,
    },
    /// Terminate all of a cluster's nodes
    Destroy {
        cluster: String,
        #[command(flatten)]
        connect: ConnectArgs,
        /// Also delete the cluster's security groups
        #[arg(long)]
        delete_groups: bool,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Open an ssh session on the cluster's master
    Login {
        cluster: String,
        #[command(flatten)]
        connect: ConnectArgs,
        #[command(flatten)]
        access: AccessArgs,
        /// Forward a SOCKS proxy at [ADDRESS:]PORT over the session
        #[arg(short = 'D', value_name = "[ADDRESS:]PORT")]
        proxy_port: Option<String>,
    },
    /// Stop a running cluster, keeping its EBS volumes
    Stop {
        cluster: String,
        #[command(flatten)]
        connect: ConnectArgs,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Start a stopped cluster and re-run setup on it
    Start {
        cluster: String,
        #[command(flatten)]
        connect: ConnectArgs,
        #[command(flatten)]
        access: AccessArgs,
        /// Seconds to wait for nodes to start
        #[arg(short = 'w', long, default_value_t = 120)]
        wait: u64,
        /// Worker instance type, for capacity accounting
        #[arg(short = 't', long, default_value = "m1.xlarge")]
        instance_type: String,
        /// Swap space to configure per node, in MB
        #[arg(long, default_value_t = 1024)]
        swap: u32,
        /// Directory of configuration templates to deploy
        #[arg(long, default_value = "deploy.generic")]
        template_dir: PathBuf,
    },
    /// Print the master's public DNS name
    GetMaster {
        cluster: String,
        #[command(flatten)]
        connect: ConnectArgs,
    },
    /// Copy seed data into the cluster's HDFS
    CopyData {
        cluster: String,
        #[command(flatten)]
        connect: ConnectArgs,
        #[command(flatten)]
        access: AccessArgs,
        /// Worker instance type, for capacity accounting
        #[arg(short = 't', long, default_value = "m1.xlarge")]
        instance_type: String,
        /// Pull from the S3 buckets via distcp instead of the
        /// attached data volume
        #[arg(long)]
        from_s3: bool,
        #[command(flatten)]
        buckets: BucketArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("skylift=info".parse()?),
        )
        .init();

    credentials::check()?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Launch {
            cluster,
            connect,
            access,
            launch,
        } => commands::launch::launch(&cluster, &connect, &access, &launch).await,
        Commands::Destroy {
            cluster,
            connect,
            delete_groups,
            yes,
        } => commands::destroy::destroy(&cluster, &connect, delete_groups, yes).await,
        Commands::Login {
            cluster,
            connect,
            access,
            proxy_port,
        } => commands::login::login(&cluster, &connect, &access, proxy_port.as_deref()).await,
        Commands::Stop {
            cluster,
            connect,
            yes,
        } => commands::lifecycle::stop(&cluster, &connect, yes).await,
        Commands::Start {
            cluster,
            connect,
            access,
            wait,
            instance_type,
            swap,
            template_dir,
        } => {
            commands::lifecycle::start(
                &cluster,
                &connect,
                &access,
                wait,
                &instance_type,
                swap,
                &template_dir,
            )
            .await
        }
        Commands::GetMaster { cluster, connect } => {
            commands::data::get_master(&cluster, &connect).await
        }
        Commands::CopyData {
            cluster,
            connect,
            access,
            instance_type,
            from_s3,
            buckets,
        } => {
            commands::data::copy_data(
                &cluster,
                &connect,
                &access,
                &instance_type,
                from_s3,
                &buckets,
            )
            .await
        }
    }
}
