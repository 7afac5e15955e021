//! Rendezvous - Main Entry Point

use api::config::AppConfig;
use api::{init_logging, run_server};
use tracing::info;

/// Config file used when `RENDEZVOUS_CONFIG` is unset
const DEFAULT_CONFIG: &str = "rendezvous";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::var("RENDEZVOUS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let config = AppConfig::load(&path)?;

    init_logging(&config.logging);

    info!("=== Rendezvous v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Store: {}, monitoring: {}",
        config.store.database_path, config.preferences.monitoring_enabled
    );

    run_server(config).await
}
