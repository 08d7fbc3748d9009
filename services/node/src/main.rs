//! servicenet node entry point
//!
//! Loads configuration, builds the runtime, serves the message socket and
//! HTTP surface, connects to configured peers and applies the launch file.

use anyhow::{Context, Result};
use clap::Parser;
use network::{spawn_connect, MessageServer, ServerConfig};
use node_config::{load_launch_file, PackageRepo, RuntimeConfig};
use service_runtime::{Runtime, RuntimeDriver, RuntimeSettings, ServiceFactory};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Process id, overrides the config file
    #[arg(long)]
    id: Option<String>,

    /// Listen port, overrides the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Peer websocket url to connect to (repeatable)
    #[arg(long)]
    connect: Vec<String>,

    /// Package repository directory
    #[arg(long)]
    repo: Option<PathBuf>,

    /// Launch file (JSON, YAML or TOML)
    #[arg(short, long)]
    launch: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(default_level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{},warp=warn,hyper=warn", default_level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn load_config(args: &Args) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::load(args.config.as_deref())?;
    if let Some(id) = &args.id {
        config.id = Some(id.clone());
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.connect.extend(args.connect.iter().cloned());
    if args.repo.is_some() {
        config.repo_dir = args.repo.clone();
    }
    if args.launch.is_some() {
        config.launch_file = args.launch.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_tracing(&config.log_level, args.json_logs);

    info!("Starting servicenet node {}", env!("CARGO_PKG_VERSION"));
    info!(id = config.process_id(), port = config.port, "Configuration loaded");

    let repo = match &config.repo_dir {
        Some(dir) => PackageRepo::load_dir(dir).with_context(|| format!("Failed to load repo {:?}", dir))?,
        None => PackageRepo::new(),
    };

    let settings = RuntimeSettings::from_config(&config);
    let (mut runtime, inbox) = Runtime::new(settings, repo, ServiceFactory::with_builtins())?;

    let (api, api_rx) = mpsc::unbounded_channel();
    let server = MessageServer::new(
        ServerConfig {
            bind_address: config.bind_address.clone(),
            port: config.port,
            local_id: runtime.local_id().to_string(),
            runtime: runtime.identity().to_string(),
        },
        runtime.links_sender(),
        api,
    );
    let server_task = tokio::spawn(server.run());

    for url in &config.connect {
        info!(url = %url, "Connecting to peer");
        spawn_connect(url.clone(), runtime.local_id().to_string(), runtime.links_sender());
    }

    if let Some(path) = &config.launch_file {
        match load_launch_file(path) {
            Ok(description) => match runtime.launch(&description) {
                Ok(launched) => info!(count = launched.len(), "Launch file applied"),
                Err(e) => warn!("Launch failed: {}", e),
            },
            Err(e) => warn!("Skipping launch file: {:#}", e),
        }
    }

    let driver = RuntimeDriver::new(runtime, inbox, api_rx);

    tokio::select! {
        _ = driver.run() => {
            warn!("Runtime driver exited");
        }
        result = server_task => {
            match result {
                Ok(Ok(())) => warn!("Message server exited"),
                Ok(Err(e)) => error!("Message server error: {}", e),
                Err(e) => error!("Message server task failed: {}", e),
            }
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        }
    }

    info!("servicenet node stopped");
    Ok(())
}
