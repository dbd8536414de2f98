use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use relmon_service::config::{ControllerConfig, PackageConfig, RemoteConfig, ServiceConfig};
use relmon_service::pairing::{CategoryPairs, PairingEngine};
use relmon_service::relmon::Job;
use relmon_service::service::Service;
use relmon_service::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "relmon-service")]
#[command(version)]
#[command(about = "RelMon job controller for HTCondor")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the controller tick loop and HTTP API
    Serve(ServeArgs),

    /// Print the reference/target pairs of a job descriptor
    Pair(PairArgs),
}

// =============================================================================
// Serve Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Address to bind the HTTP API to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port for the HTTP API
    #[arg(long, default_value = "8080")]
    port: u16,

    /// JSON file holding all jobs. Jobs are kept in memory when omitted.
    #[arg(long)]
    store: Option<PathBuf>,

    /// Seconds between controller ticks
    #[arg(long, default_value = "600")]
    tick_interval: u64,

    /// Public URL of this service, used in notifications
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    service_url: String,

    /// Local scratch directory for packages and collected logs
    #[arg(long, default_value = "relmon_scratch")]
    scratch_dir: PathBuf,

    // === Remote Options ===
    /// HTCondor submit host
    #[arg(long, default_value = "lxplus.cern.ch")]
    remote_host: String,

    /// Login on the submit host
    #[arg(long)]
    remote_user: Option<String>,

    /// Parent directory of job working directories on the submit host
    #[arg(long, default_value = "relmon")]
    remote_directory: String,

    #[arg(long, default_value = "ssh")]
    ssh_binary: String,

    #[arg(long, default_value = "scp")]
    scp_binary: String,

    /// Timeout for each remote command or transfer, in seconds
    #[arg(long, default_value = "300")]
    command_timeout: u64,

    // === Package Options ===
    /// URL the remote worker posts progress to
    #[arg(long, default_value = "http://127.0.0.1:8080/api/update")]
    callback_url: String,

    #[arg(long, default_value = "CMSSW_11_0_0")]
    cmssw_release: String,

    /// Directory on the submit host holding the grid certificate and key
    #[arg(long, default_value = "~/private")]
    grid_location: String,

    /// Where finished reports are published
    #[arg(long)]
    web_location: Option<String>,
}

// =============================================================================
// Pair Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct PairArgs {
    /// Job descriptor (RELMON_<id>.json)
    job: PathBuf,

    /// Only pair this category
    #[arg(long, short = 'c')]
    category: Option<String>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct CategoryOutput {
    category: String,
    #[serde(flatten)]
    pairs: CategoryPairs,
}

// =============================================================================
// Command Handlers
// =============================================================================

async fn run_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let listen_addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    let mut remote = RemoteConfig::new(args.remote_host)
        .with_binaries(args.ssh_binary, args.scp_binary)
        .with_timeout_secs(args.command_timeout);
    if let Some(user) = args.remote_user {
        remote = remote.with_user(user);
    }

    let mut package = PackageConfig::default().with_callback_url(args.callback_url);
    package.cmssw_release = args.cmssw_release;
    package.grid_location = args.grid_location;
    if let Some(web_location) = args.web_location {
        package.web_location = web_location;
    }

    let mut controller = ControllerConfig::new(args.remote_directory, args.scratch_dir);
    controller.service_url = args.service_url;

    let mut config = ServiceConfig::new(listen_addr).with_tick_interval_secs(args.tick_interval);
    if let Some(store) = args.store {
        config = config.with_store_path(store);
    }
    config.remote = remote;
    config.package = package;
    config.controller = controller;

    tracing::info!(
        listen_addr = %config.listen_addr,
        remote_host = %config.remote.host,
        tick_interval_secs = config.tick_interval_secs,
        store = ?config.store_path,
        "Starting relmon-service"
    );

    let shutdown = install_shutdown_handler()?;
    let service = Service::from_config(config).await?;
    service.run(shutdown).await?;

    Ok(())
}

fn run_pair(args: PairArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut job: Job = serde_json::from_slice(&std::fs::read(&args.job)?)?;
    let engine = PairingEngine::new();

    let mut results = Vec::new();
    for category in &mut job.categories {
        if args
            .category
            .as_ref()
            .is_some_and(|name| name != &category.name)
        {
            continue;
        }
        results.push(CategoryOutput {
            category: category.name.clone(),
            pairs: engine.pair_category(category)?,
        });
    }

    match args.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        OutputFormat::Table => {
            for result in &results {
                println!("{} ({} pairs)", result.category, result.pairs.len());
                for (reference, target) in result.pairs.references.iter().zip(&result.pairs.targets) {
                    println!("  {}", reference);
                    println!("    -> {}", target);
                }
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Serve(serve_args) => {
            run_serve(serve_args).await?;
        }
        Commands::Pair(pair_args) => {
            run_pair(pair_args)?;
        }
    }

    Ok(())
}
