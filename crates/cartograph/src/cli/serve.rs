//! `cartograph serve`: run the worker pool until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use cartograph_agent::BrowserBridge;
use cartograph_protocol::SystemConfig;
use cartograph_sentinel::{BridgeFactory, Sentinel};
use cartograph_trackers::TrackerConfig;

use crate::providers::{DryRunBridge, DryRunModel};

pub async fn run(config: &SystemConfig) -> Result<()> {
    let pool = super::connect(config).await?;

    let factory: BridgeFactory = Arc::new(|| Arc::new(DryRunBridge) as Arc<dyn BrowserBridge>);
    let tracker = cartograph_trackers::connect(&TrackerConfig::InMemory)
        .context("Tracker unavailable")?;
    let sentinel = Sentinel::start(
        pool,
        config,
        Arc::new(DryRunModel),
        factory,
        Some(Arc::from(tracker)),
    )
    .await
    .context("Sentinel failed to start")?;

    info!(
        workers = config.agent.max_concurrent_workers,
        "Cartograph serving; Ctrl-C to stop"
    );
    tokio::signal::ctrl_c()
        .await
        .context("Failed to install signal handler")?;

    info!("Shutdown requested");
    sentinel.shutdown().await;
    Ok(())
}
