use clap::Parser;
use dns_keeper::config::types::{Config, StoreBackend};
use dns_keeper::connection::manager::ConnectionManager;
use dns_keeper::connection::types::ConnectionSettings;
use dns_keeper::health::handlers::health_router;
use dns_keeper::kv::client::KvConnector;
use dns_keeper::kv::etcd::EtcdConnector;
use dns_keeper::kv::memory::{MemoryConnector, MemoryKv};
use dns_keeper::storage::domain::DomainStorage;
use dns_keeper::storage::keys::KeyLayout;
use dns_keeper::storage::zone::ZoneStorage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// How long the startup resync waits for the first connection.
const STARTUP_RESYNC_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "dns-keeper", about = "DNS zone and record management backend")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logger.level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Loaded configuration from {}", args.config.display());

    // 1. Store connection:
    let connector: Arc<dyn KvConnector> = match config.store.backend {
        StoreBackend::Etcd => {
            tracing::info!("Using etcd endpoints {:?}", config.store.endpoints);
            Arc::new(EtcdConnector)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-process memory store; data is lost on exit");
            MemoryConnector::new(MemoryKv::new())
        }
    };
    let connection = ConnectionManager::new(ConnectionSettings::from(&config.store), connector);
    connection.start();

    // 2. Storage layer:
    let layout = KeyLayout::new(config.store.dns_root());
    tracing::info!("Projecting DNS records under {}", layout.dns_root());
    let domains = Arc::new(DomainStorage::new(connection.clone(), layout));
    let zones = ZoneStorage::new(domains.clone());

    // 3. Startup resync:
    let resync_connection = connection.clone();
    tokio::spawn(async move {
        if let Err(e) = resync_connection.wait_for_connection(STARTUP_RESYNC_WAIT).await {
            tracing::warn!("Skipping startup resync: {}", e);
            return;
        }
        match zones.list_zones().await {
            Ok(listed) => tracing::info!("Managing {} zone(s)", listed.len()),
            Err(e) => tracing::warn!("Failed to list zones: {}", e),
        }
        if let Err(e) = zones.domains().resync_all().await {
            tracing::warn!("Startup resync failed: {}", e);
        }
    });

    // 4. Health server:
    let http_addr = format!("{}:{}", config.app.host, config.app.port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("HTTP server listening on {}", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, health_router(connection.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    connection.close().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
