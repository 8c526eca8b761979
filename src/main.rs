//! Breakwater gateway daemon.
//!
//! A resilient request router for unreliable upstream HTTP services,
//! built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────┐
//!                      │                 BREAKWATER GATEWAY               │
//!                      │                                                  │
//!   POST /v1/execute   │  ┌─────────┐   ┌───────────┐   ┌─────────────┐  │
//!   ───────────────────┼─▶│  http   │──▶│ executor  │──▶│  transport  │──┼──▶ upstream
//!                      │  │ gateway │   │ pipeline  │   │  (HTTP out) │  │    services
//!                      │  └─────────┘   └─────┬─────┘   └─────────────┘  │
//!                      │                      │                          │
//!                      │      ┌───────────────┼────────────────┐         │
//!                      │      ▼               ▼                ▼         │
//!                      │  ┌───────┐   ┌─────────────┐   ┌───────────┐    │
//!                      │  │ cache │   │ resilience  │   │  routing  │    │
//!                      │  │  TTL  │   │ breaker/rate│   │ fallback  │    │
//!                      │  └───────┘   └─────────────┘   └───────────┘    │
//!                      │                                                 │
//!                      │  ┌───────────────────────────────────────────┐  │
//!                      │  │           Cross-Cutting Concerns          │  │
//!                      │  │  config (hot reload) · health probes ·    │  │
//!                      │  │  observability · admin API · lifecycle    │  │
//!                      │  └───────────────────────────────────────────┘  │
//!                      └─────────────────────────────────────────────────┘
//! ```
//!
//! Startup order: config, logging, metrics, router, health monitor,
//! config watcher, gateway listener. A config reload builds a whole new
//! router generation and swaps it in; the listener never restarts.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use breakwater::config::load_config;
use breakwater::config::watcher::ConfigWatcher;
use breakwater::health::HealthMonitor;
use breakwater::http::{AppState, GatewayInner, GatewayServer};
use breakwater::observability::{logging, metrics};
use breakwater::transport::HttpTransport;
use breakwater::Shutdown;

/// Resilient request router for unreliable upstream HTTP services.
#[derive(Parser)]
#[command(name = "breakwater", version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "breakwater.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(&args.config)?;
    logging::init_logging(&config.observability);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_path = %args.config.display(),
        "breakwater starting"
    );
    info!(
        bind_address = %config.server.bind_address,
        endpoints = config.endpoints.len(),
        fallback_rules = config.fallback_rules.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let bind_address = config.server.bind_address.clone();
    let transport = Arc::new(HttpTransport::new());
    let state = AppState::new(GatewayInner::new(config, Arc::clone(&transport)));
    let shutdown = Arc::new(Shutdown::new());

    // Health monitor for the initial generation. Reloads stop it and
    // spawn a fresh one against the new registry.
    let monitor_stop = spawn_monitor(&state, Arc::clone(&transport));

    let (watcher, reload_rx) = ConfigWatcher::new(&args.config);
    let _watcher_handle = match watcher.run() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Config watcher unavailable, hot reload disabled");
            None
        }
    };

    let reload_task = tokio::spawn(apply_reloads(
        state.clone(),
        Arc::clone(&transport),
        reload_rx,
        monitor_stop,
        shutdown.subscribe(),
    ));

    tokio::spawn({
        let shutdown = Arc::clone(&shutdown);
        async move { shutdown.listen_for_signals().await }
    });

    let listener = TcpListener::bind(&bind_address).await?;
    let server = GatewayServer::new(state);
    server.run(listener, shutdown.subscribe()).await?;

    let _ = reload_task.await;
    info!("Shutdown complete");
    Ok(())
}

/// Swaps each validated config from the watcher in as a new generation.
/// The old generation, and the response cache inside it, drops once the
/// last in-flight request lets go of it.
async fn apply_reloads(
    state: AppState,
    transport: Arc<HttpTransport>,
    mut reload_rx: tokio::sync::mpsc::UnboundedReceiver<breakwater::RouterConfig>,
    mut monitor_stop: broadcast::Sender<()>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            maybe = reload_rx.recv() => {
                let Some(new_config) = maybe else { break };
                info!(
                    endpoints = new_config.endpoints.len(),
                    fallback_rules = new_config.fallback_rules.len(),
                    "Applying reloaded configuration"
                );
                state.swap(GatewayInner::new(new_config, Arc::clone(&transport)));
                let _ = monitor_stop.send(());
                monitor_stop = spawn_monitor(&state, Arc::clone(&transport));
            }
            _ = shutdown.recv() => break,
        }
    }
    let _ = monitor_stop.send(());
}

/// Spawns a health monitor against the current router generation and
/// returns the sender that stops it.
fn spawn_monitor(state: &AppState, transport: Arc<HttpTransport>) -> broadcast::Sender<()> {
    let (stop_tx, stop_rx) = broadcast::channel(1);
    let inner = state.inner.load_full();
    let monitor = HealthMonitor::new(
        inner.router.registry(),
        inner.router.breaker(),
        transport,
        inner.config.health.clone(),
    );
    tokio::spawn(monitor.run(stop_rx));
    stop_tx
}
