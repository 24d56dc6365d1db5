//! Entry point for the costing engine binary.
//!
//! Running this binary starts an HTTP server exposing project costing,
//! pricing and approval over a REST API.  Settings are read from
//! `COSTING_*` environment variables and the pricing file (see
//! [`costing_engine::config`]); logging is controlled with `RUST_LOG`.

use anyhow::{Context, Result};
use costing_engine::config::AppConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        rate_dir = %config.rate_dir.display(),
        overhead_rate = %config.pricing.overhead_rate,
        gst_liable = config.pricing.gst_liable,
        "configuration loaded"
    );
    costing_engine::api::serve(&config).await
}
