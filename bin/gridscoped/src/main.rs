//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Binary entrypoint for the gridscope daemon."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gridscope_common::{init_tracing, AppConfig};
use gridscope_core::{restore_snapshot, SnapshotWriter, TopologyService};
use gridscope_net::{RestApiBuilder, RestApiHandle};
use gridscope_persistence::PersistenceMetrics;
use prometheus::Registry;
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "gridscope network topology and diagram daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "ADDR", help = "Override the API listen address")]
    listen: Option<SocketAddr>,

    #[arg(long, value_name = "FILE", help = "Override the snapshot file (.json or .cbor)")]
    snapshot: Option<PathBuf>,

    #[arg(long, help = "Start empty instead of restoring the last snapshot")]
    no_restore: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/gridscope.toml"));
    candidates.push(PathBuf::from("configs/gridscope.dev.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(listen) = cli.listen {
        config.api.listen = listen;
    }
    if let Some(snapshot) = cli.snapshot {
        config.snapshot.path = snapshot;
    }
    if cli.no_restore {
        config.snapshot.restore_on_start = false;
    }
    init_tracing("gridscoped", &config.logging)?;
    match &loaded.source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; running with defaults"),
    }

    run_daemon(config).await
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    let registry = config
        .metrics
        .enabled
        .then(|| Arc::new(Registry::new()));
    if registry.is_none() {
        info!("metrics disabled by configuration");
    }
    let persistence_metrics = match &registry {
        Some(registry) => Some(Arc::new(PersistenceMetrics::new(Arc::clone(registry))?)),
        None => None,
    };

    let service = TopologyService::from_config(&config, registry.clone())?;

    // Subscribe before restoring so no upload can slip past the writer.
    let writer = config.snapshot.enabled.then(|| {
        SnapshotWriter::spawn(
            Arc::clone(service.store()),
            config.snapshot.path.clone(),
            persistence_metrics.clone(),
        )
    });

    if config.snapshot.enabled && config.snapshot.restore_on_start {
        match restore_snapshot(
            service.store(),
            &config.snapshot.path,
            persistence_metrics.as_deref(),
        )
        .await
        {
            Ok(Some(network)) => {
                info!(network_id = %network.id(), version = %network.version(), "serving restored network")
            }
            Ok(None) => info!("no snapshot found; waiting for first upload"),
            Err(err) => warn!(
                path = %config.snapshot.path.display(),
                error = %err,
                "snapshot restore failed; starting empty"
            ),
        }
    }

    let mut api_server: Option<RestApiHandle> = None;
    if config.api.enabled {
        let mut builder = RestApiBuilder::new(config.api.listen, service.clone())
            .with_heartbeat(config.api.heartbeat)
            .with_max_upload_bytes(config.api.max_upload_bytes);
        if let Some(registry) = &registry {
            builder = builder.with_metrics_registry(Arc::clone(registry));
        }
        let server = builder
            .spawn()
            .await
            .with_context(|| format!("failed to bind api server on {}", config.api.listen))?;
        info!(address = %server.local_addr(), "api server listening");
        api_server = Some(server);
    } else {
        info!("api server disabled by configuration");
    }

    info!("daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    if let Some(server) = api_server {
        server.shutdown().await?;
    }
    if let Some(writer) = writer {
        writer.shutdown().await;
    }

    Ok(())
}
