use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

mod api;
mod config;
mod diff;
mod engine;
mod format;
mod models;
mod notify;
mod probes;
mod state;
mod window;

use crate::config::MonitorConfig;
use crate::engine::Monitor;

const CONFIG_ENV: &str = "FLEET_MONITOR_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into()))
        .with_ansi(true)
        .init();

    let config_path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "config.json".into());
    let config = MonitorConfig::load(&config_path)?;

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")?;
    let notifier = notify::from_config(&config, client.clone());
    let monitor = Arc::new(Monitor::from_config(&config, client, notifier));

    let api_monitor = Arc::clone(&monitor);
    let api_port = config.api_port;
    tokio::spawn(async move {
        if let Err(e) = api::start_server(api_port, api_monitor).await {
            error!("Status endpoint failed: {:#}", e);
        }
    });

    let timers = monitor.start();

    signal::ctrl_c().await?;
    info!("Shutdown signal received. Stopping fleet monitor...");
    for timer in timers {
        timer.abort();
    }

    Ok(())
}
