use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use stratumd::services::responder::bind_socket;
use stratumd::{Config, Core, GpsFix, Monitor, Responder, StatsStore, TargetRegistry, TimeSource};

#[derive(Parser, Debug)]
#[command(name = "stratumd")]
#[command(about = "GPS-backed stratum-1 NTP server with remote server monitoring")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// UDP port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Probe cycle interval in seconds (overrides config)
    #[arg(short, long)]
    interval: Option<u64>,

    /// Monitored server, "host" or "host:port", repeatable
    #[arg(short, long = "target")]
    targets: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    #[serde(flatten)]
    core: Config,
    targets: Vec<TargetEntry>,
}

#[derive(Debug, Deserialize)]
struct TargetEntry {
    address: String,
    #[serde(default = "default_ntp_port")]
    port: u16,
    name: Option<String>,
}

fn default_ntp_port() -> u16 {
    123
}

fn load_config(args: &Args) -> Result<FileConfig, String> {
    let mut file = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
            toml::from_str(&raw).map_err(|e| format!("invalid config file: {}", e))?
        }
        None => FileConfig::default(),
    };
    if let Some(port) = args.port {
        file.core.listen_port = port;
    }
    if let Some(interval) = args.interval {
        file.core.poll_interval_secs = interval;
    }
    for spec in &args.targets {
        let (address, port) = match spec.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => {
                let port: u16 = port
                    .parse()
                    .map_err(|_| format!("invalid port in target '{}'", spec))?;
                (host.to_string(), port)
            }
            _ => (spec.clone(), 123),
        };
        file.targets.push(TargetEntry {
            address,
            port,
            name: None,
        });
    }
    Ok(file)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let file = match load_config(&args) {
        Ok(f) => f,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    let config = file.core.clone();

    let time = Arc::new(TimeSource::new());
    let registry = Arc::new(TargetRegistry::new());
    let stats = Arc::new(StatsStore::new(config.history_capacity, config.weights));
    let core = Core::new(
        Arc::clone(&time),
        Arc::clone(&registry),
        Arc::clone(&stats),
        config.clone(),
    );

    for entry in &file.targets {
        if let Err(e) = core.add_target(&entry.address, entry.port as u32, entry.name.as_deref()) {
            error!(address = %entry.address, port = entry.port, "skipping target: {}", e);
        }
    }
    info!(targets = registry.len(), "target registry initialized");

    // Bind before spawning anything; a taken port is fatal.
    let socket = match bind_socket(config.listen_port).await {
        Ok(s) => s,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // The GPS ingestion collaborator pushes calibrated fixes through this
    // channel. Until something feeds it, the responder answers at
    // stratum 16.
    let (fix_tx, fix_rx) = mpsc::channel::<GpsFix>(16);
    let feed = tokio::spawn(stratumd::run_feed(
        Arc::clone(&time),
        fix_rx,
        shutdown_rx.clone(),
    ));

    let responder = Arc::new(Responder::new(Arc::clone(&time), config.clone()));
    let responder_task = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { responder.serve(socket, shutdown).await })
    };

    let monitor = Monitor::new(Arc::clone(&registry), Arc::clone(&stats), config.clone());
    let monitor_task = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { monitor.run(shutdown).await })
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("cannot listen for shutdown signal: {}", e);
    }
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let grace = config.shutdown_grace() + Duration::from_secs(1);
    for (name, task) in [
        ("responder", responder_task),
        ("monitor", monitor_task),
        ("feed", feed),
    ] {
        if tokio::time::timeout(grace, task).await.is_err() {
            warn!(task = name, "task did not stop within grace period");
        }
    }
    drop(fix_tx);
    info!("stratumd stopped");
}
