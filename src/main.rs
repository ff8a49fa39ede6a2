use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gatekeeper::config::{GatekeeperConfig, StoreBackend};
use gatekeeper::http::{AdmissionGate, HttpServer};
use gatekeeper::ratelimit::RateLimitEngine;
use gatekeeper::store::{CounterStore, MemoryCounterStore, RedisCounterStore, RedisStoreConfig};

/// How often expired in-memory counters are dropped.
const MEMORY_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "gatekeeper", version, about = "Distributed notification rate limiting service")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the HTTP listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.log_format);

    info!("Starting Gatekeeper Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = GatekeeperConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.http_addr = listen;
    }
    info!(
        http_addr = %config.server.http_addr,
        backend = ?config.store.backend,
        failure_policy = ?config.rate_limiting.failure_policy,
        "Configuration loaded"
    );

    let registry = Arc::new(config.rate_limiting.registry()?);
    if registry.is_empty() {
        warn!("No rate limit policies configured; every notification type will be rejected");
    }

    let store: Arc<dyn CounterStore> = match config.store.backend {
        StoreBackend::Redis => {
            let store = RedisCounterStore::connect(RedisStoreConfig::from(&config.store)).await?;
            Arc::new(store)
        }
        StoreBackend::Memory => {
            warn!("Using in-memory counter store; limits are not shared between instances");
            let store = Arc::new(MemoryCounterStore::new());
            spawn_purge_task(Arc::clone(&store));
            store
        }
    };

    let engine = Arc::new(RateLimitEngine::new(registry, store));
    info!(types = ?engine.registry().type_names(), "Rate limiter initialized");

    let gate = Arc::new(
        AdmissionGate::new(
            engine,
            config.server.path_prefix.clone(),
            config.rate_limiting.failure_policy,
        )
        .with_max_body_bytes(config.server.max_body_bytes),
    );

    let server = HttpServer::new(config.server.http_addr, gate);

    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Gatekeeper Rate Limiting Service stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn spawn_purge_task(store: Arc<MemoryCounterStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MEMORY_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            store.purge_expired();
        }
    });
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
