//! Nexus live server
//!
//! Run with: nexus-server [--config nexus.toml] [--verbose]
//!
//! Publish with ffmpeg:
//!   ffmpeg -re -i input.mp4 -c copy -f flv "rtmp://localhost/live/alpha?key=secret1"
//!
//! Watch status events:
//!   websocat ws://localhost:8080/v1/ws/updates

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nexus_server::api::{self, AppState};
use nexus_server::{Bridge, Hub, IngestServer, MemoryStore, NexusConfig, StreamRegistry};

/// Live video ingest and real-time stream status server
#[derive(Parser, Debug)]
#[command(name = "nexus-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => NexusConfig::load(path),
        None => Ok(NexusConfig::default()),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("nexus-server: {e}");
            std::process::exit(1);
        }
    };

    let filter = if args.verbose || config.log.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "nexus_server=info".into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting nexus-server");

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}

async fn run(config: NexusConfig) -> nexus_server::Result<()> {
    let ingest_config = config.ingest_config()?;
    let api_addr = config.api_addr()?;

    let (records, generated) = config.stream_records();
    for record in records.iter().filter(|r| generated.contains(&r.stream_name)) {
        tracing::info!(stream = %record.stream_name, key = %record.key, "Generated stream key");
    }
    let store = MemoryStore::with_records(records)?;

    let (viewer_hub, viewers) = Hub::new("updates");
    viewer_hub.spawn();
    let (status_hub, status) = Hub::with_handler("status", Bridge::new(viewers.clone()));
    status_hub.spawn();

    let registry = Arc::new(StreamRegistry::new(store, status.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
                // Dropping the sender would stop both servers
                std::future::pending::<()>().await;
                drop(shutdown_tx);
            }
        }
    });

    let state = AppState {
        viewers,
        status,
        registry: Arc::clone(&registry),
        hub_config: config.hub,
    };
    let api_listener = TcpListener::bind(api_addr).await?;
    let api_task = tokio::spawn(api::serve(api_listener, state, shutdown_signal(shutdown_rx.clone())));

    let ingest = IngestServer::new(ingest_config, registry);
    ingest.run_until(shutdown_signal(shutdown_rx)).await?;

    match api_task.await {
        Ok(result) => result?,
        Err(e) => tracing::error!(error = %e, "HTTP API task failed"),
    }

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stopped| *stopped).await;
}
