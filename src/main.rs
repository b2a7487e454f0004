//! Exporter binary entry point.

use pulse_exporter::{MetricsConfig, MetricsService};
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => match MetricsConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load configuration from '{path}': {e}");
                std::process::exit(1);
            }
        },
        None => {
            warn!("no configuration file given, using defaults");
            MetricsConfig::default()
        }
    };

    let mut service = MetricsService::new(config);
    if let Err(e) = service.start().await {
        eprintln!("failed to start metrics service: {e}");
        std::process::exit(1);
    }
    info!("pulse-exporter v{} running", env!("CARGO_PKG_VERSION"));

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
    if let Err(e) = service.stop().await {
        warn!(error = %e, "shutdown error");
    }
}
