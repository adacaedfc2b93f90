//! Restaurant CRM server - guests, bookings, segmentation and broadcasts.
//!
//! Main entry point that wires the store, segmentation and webhooks and starts the server.

use clap::Parser;
use crm_api::{ApiServer, AppState};
use crm_core::config::AppConfig;
use crm_notify::WebhookDispatcher;
use crm_store::MemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "crm-server")]
#[command(about = "Restaurant guest CRM with visit-based segmentation")]
#[command(version)]
struct Cli {
    /// Bind address (overrides config)
    #[arg(long, env = "CRM__API__HOST")]
    host: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "CRM__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Prometheus exporter port (overrides config)
    #[arg(long, env = "CRM__METRICS__PORT")]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "crm_server=info,crm_api=info,crm_segmentation=info,tower_http=info".into()
            }),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("CRM server starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(host) = cli.host {
        config.api.host = host;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }

    info!(
        instance = %config.instance_name,
        http_port = config.api.http_port,
        metrics_port = config.metrics.port,
        regular_default = config.segmentation.default_regular_threshold,
        vip_default = config.segmentation.default_vip_threshold,
        "Configuration loaded"
    );

    let store = Arc::new(MemoryStore::new());
    let webhooks = WebhookDispatcher::new(&config.webhooks).unwrap_or_else(|e| {
        error!(error = %e, "Failed to build webhook client, webhooks disabled");
        WebhookDispatcher::disabled()
    });

    let reconcile_interval = config.segmentation.reconcile_interval_secs;
    let state = AppState::new(config, store, webhooks);
    let api_server = ApiServer::new(state.clone());

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics() {
        error!(error = %e, "Failed to start metrics exporter");
    }

    // Spawn periodic segment reconciliation
    if reconcile_interval > 0 {
        let reconciler = state.reconciler.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(reconcile_interval));
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = reconciler.reconcile_all() {
                    error!(error = %e, "Periodic segment reconciliation failed");
                }
            }
        });
        info!(interval_secs = reconcile_interval, "Periodic reconciliation enabled");
    }

    info!("CRM server is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
