//! # Vigil Server
//!
//! Reconnaissance scan orchestration with real-time event streaming.
//!
//! Composition root: wires the transport, store, event bus, orchestrator,
//! and WebSocket gateways together, then serves. Ordering matters here —
//! every bus handler (orchestrator, scan fan-out) registers before
//! [`ScanEventBus::start`] opens the upstream subscription, and the bus is
//! running before the first HTTP request can publish `scan.created`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil_core::{MemoryScanStore, PostgresScanStore, ScanStore};

use vigil_server::handlers::scans_ws::install_scan_fanout;
use vigil_server::infra::app_state::AppState;
use vigil_server::infra::bus::{
    EventTransport, LocalTransport, RedisTransport, ScanEventBus,
};
use vigil_server::infra::config::Config;
use vigil_server::infra::orchestration::{
    OrchestratorSettings, ScanOrchestrator,
};
use vigil_server::routes;
use vigil_server::scanner::ScannerAdapter;
use vigil_server::websocket::ConnectionManager;

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "vigil-server")]
#[command(about = "Reconnaissance scan orchestrator with real-time event streaming")]
struct Cli {
    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
            |_| {
                tracing_subscriber::EnvFilter::new(
                    "vigil_server=debug,vigil_core=debug,tower_http=info",
                )
            },
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::from_env();
    if let Some(port) = cli.port {
        config.server_port = port;
    }
    if let Some(host) = cli.host {
        config.server_host = host;
    }
    let config = Arc::new(config);

    let transport: Arc<dyn EventTransport> = match &config.redis_url {
        Some(url) => {
            let transport = RedisTransport::connect(url)
                .await
                .context("failed to connect to Redis")?;
            info!("connected to Redis pub/sub");
            Arc::new(transport)
        }
        None => {
            warn!(
                "REDIS_URL not set; events stay within this process only"
            );
            Arc::new(LocalTransport::new())
        }
    };

    let store: Arc<dyn ScanStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresScanStore::connect(url)
                .await
                .context("failed to connect to PostgreSQL")?;
            info!("connected to PostgreSQL");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set; scans are not persisted");
            Arc::new(MemoryScanStore::new())
        }
    };

    let bus = Arc::new(ScanEventBus::new(Arc::clone(&transport)));
    let scanner = Arc::new(ScannerAdapter::new(
        config.subdomain_scanner.clone(),
        config.port_scanner.clone(),
    ));
    let orchestrator = Arc::new(ScanOrchestrator::new(
        Arc::clone(&store),
        Arc::clone(&bus),
        scanner,
        OrchestratorSettings {
            max_port_scan_targets: config.max_port_scan_targets,
        },
    ));
    let websocket_manager = Arc::new(ConnectionManager::new());

    // Handlers first, then open the upstream subscription.
    orchestrator.start();
    install_scan_fanout(Arc::clone(&websocket_manager), &bus);
    bus.start().await.context("failed to start event bus")?;

    let state = AppState {
        config: Arc::clone(&config),
        store,
        bus,
        transport,
        websocket_manager,
    };
    let app = routes::create_router(state);

    let addr: SocketAddr =
        format!("{}:{}", config.server_host, config.server_port)
            .parse()
            .context("invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
