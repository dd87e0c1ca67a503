//! ha-bootstrap: configure a freshly launched three-node HA cluster
//!
//! Role fragments, key and security group normally come from the
//! environment (or a `.env` file), matching the rest of the deployment
//! tooling.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ha_bootstrap::aws::{AwsCli, Ec2Inventory, SecurityGroupFirewall};
use ha_bootstrap::bootstrap::cli::{execute_command, Commands};
use ha_bootstrap::cluster::{FileInventory, InventorySource};
use ha_bootstrap::config::Config;
use ha_bootstrap::firewall::{Firewall, RecordingFirewall};
use ha_bootstrap::remote::{RecordingExecutor, RemoteExecutor, SshExecutor};
use ha_bootstrap::{Orchestrator, PlanSettings};

#[derive(Parser)]
#[command(name = "ha-bootstrap")]
#[command(about = "Network bootstrap for a three-node ZooKeeper + HA journal cluster on EC2")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "HA_BOOTSTRAP_CONFIG", default_value = "ha-bootstrap.toml")]
    config: PathBuf,

    /// Name fragment of the first node (ensemble member 1)
    #[arg(long, env = "BIGDATA_HA_HOST_A")]
    host_a: Option<String>,

    /// Name fragment of the second node (ensemble member 2)
    #[arg(long, env = "BIGDATA_HA_HOST_B")]
    host_b: Option<String>,

    /// Name fragment of the third node (ensemble member 3)
    #[arg(long, env = "BIGDATA_HA_HOST_C")]
    host_c: Option<String>,

    /// Private key for ssh to the nodes
    #[arg(long, env = "AWS_SSH_PRIVATE_KEY")]
    private_key: Option<PathBuf>,

    /// Private security group granted node-to-node ingress
    #[arg(long, env = "AWS_SECURITY_GROUP_PRIVATE")]
    security_group: Option<String>,

    /// AWS region
    #[arg(long, env = "AWS_DEFAULT_REGION")]
    region: Option<String>,

    /// ssh login user
    #[arg(long, env = "HA_BOOTSTRAP_SSH_USER")]
    user: Option<String>,

    /// Read instances from a JSON file instead of querying EC2
    #[arg(long)]
    inventory_file: Option<PathBuf>,

    /// Print commands instead of executing them
    #[arg(long)]
    dry_run: bool,

    /// Configure the three nodes concurrently
    #[arg(long)]
    parallel: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    /// Apply CLI and environment overrides on top of the file config
    fn apply(&self, config: &mut Config) {
        if let Some(a) = &self.host_a {
            config.roles.a = a.clone();
        }
        if let Some(b) = &self.host_b {
            config.roles.b = b.clone();
        }
        if let Some(c) = &self.host_c {
            config.roles.c = c.clone();
        }
        if let Some(key) = &self.private_key {
            config.remote.private_key = Some(key.clone());
        }
        if let Some(group) = &self.security_group {
            config.aws.security_group_id = Some(group.clone());
        }
        if let Some(region) = &self.region {
            config.aws.region = Some(region.clone());
        }
        if let Some(user) = &self.user {
            config.remote.user = user.clone();
        }
        if let Some(file) = &self.inventory_file {
            config.aws.inventory_file = Some(file.clone());
        }
        config.run.dry_run |= self.dry_run;
        config.run.parallel |= self.parallel;
    }
}

fn build_orchestrator(config: &Config) -> anyhow::Result<Orchestrator> {
    let aws = AwsCli::new(
        config.aws.cli_path.clone(),
        config.aws.region.clone(),
        Duration::from_secs(config.aws.timeout_secs),
    );

    let inventory: Box<dyn InventorySource> = match &config.aws.inventory_file {
        Some(path) => Box::new(FileInventory::new(path.clone())),
        None => Box::new(Ec2Inventory::new(aws.clone())),
    };

    let executor: Box<dyn RemoteExecutor>;
    let firewall: Box<dyn Firewall>;
    if config.run.dry_run {
        info!("Dry run: commands are printed, nothing is executed");
        executor = Box::new(RecordingExecutor::echoing());
        firewall = Box::new(RecordingFirewall::echoing());
    } else {
        executor = Box::new(SshExecutor::new(config.ssh_config()?));
        firewall = Box::new(SecurityGroupFirewall::new(aws));
    }

    Ok(Orchestrator::new(inventory, executor, firewall, PlanSettings::from_config(config))
        .with_parallel(config.run.parallel))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("ha_bootstrap={},warn", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::load(&cli.config)?;
    cli.apply(&mut config);

    let command = cli.command.clone().unwrap_or(Commands::Run);
    if matches!(command, Commands::Plan | Commands::Resolve | Commands::Status) {
        // Read-only commands never touch the nodes
        config.run.dry_run = true;
    }

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(2);
    }

    info!(
        roles = ?[&config.roles.a, &config.roles.b, &config.roles.c],
        dry_run = config.run.dry_run,
        parallel = config.run.parallel,
        "Starting ha-bootstrap"
    );

    let orchestrator = build_orchestrator(&config)?;
    let result = execute_command(
        &orchestrator,
        command,
        Duration::from_secs(config.status.check_timeout_secs),
        Duration::from_secs(config.status.poll_interval_secs),
    )
    .await;

    match result {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
