//! Reservation engine HTTP server.
//!
//! This binary:
//! - Loads configuration from the environment (and `.env`)
//! - Installs the Prometheus exporter on `METRICS_HOST:METRICS_PORT`
//! - Builds the reservation store (memory or `PostgreSQL`)
//! - Runs the expiry sweeper and the HTTP API until Ctrl+C
//!
//! # Usage
//!
//! ```bash
//! STORE_BACKEND=postgres DATABASE_URL=postgres://... DISPLAYS_FILE=displays.json \
//!     cargo run --bin adslot-server
//! ```

use adslot_engine::app::Application;
use adslot_engine::metrics::register_business_metrics;
use adslot_engine::Config;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,adslot_engine=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting reservation engine");

    let config = Config::from_env()?;
    tracing::info!(
        store = ?config.store.backend,
        capacity_policy = %config.booking.capacity_policy,
        grace_period_secs = config.booking.grace_period_secs,
        "Configuration loaded"
    );

    let metrics_addr: SocketAddr =
        format!("{}:{}", config.server.metrics_host, config.server.metrics_port).parse()?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()?;
    register_business_metrics();
    tracing::info!(%metrics_addr, "Prometheus exporter listening");

    let app = Application::build(config).await?;
    tracing::info!(address = %app.local_addr()?, "Reservation engine ready");
    app.run().await?;

    Ok(())
}
