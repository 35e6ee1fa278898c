//! SSPanel node synchronizer
//!
//! Keeps node settings, the authorized user set and detect rules in sync with the panel,
//! and reports usage back on a fixed schedule.

// Use mimalloc as the global allocator for better performance
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use sspanel_node::business::{
    BackgroundTasks, PanelClient, PanelConfig, SyncRegistry, TaskConfig,
};
use sspanel_node::config::CliArgs;
use sspanel_node::logger::{self, log};
use sspanel_node::stats::UsageCollector;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = CliArgs::parse_args();
    cli.validate()?;

    // Initialize logger
    logger::init_logger(&cli.log_mode);

    log::info!(
        api = %cli.api_host,
        node = cli.node_id,
        node_type = %cli.node_type,
        "Starting panel node synchronizer"
    );

    let panel_config = PanelConfig::from_cli(&cli)?;
    let client = Arc::new(PanelClient::new(panel_config)?);
    let registry = Arc::new(SyncRegistry::new());

    // Node info is required before anything else can run
    let node = client
        .fetch_node_info()
        .await
        .context("Failed to fetch initial node info")?;
    registry.set_node(node).await;

    // Users and rules fall back to empty sets until the next update tick
    match client.fetch_users().await {
        Ok(users) => {
            registry.update_users(&users).await;
        }
        Err(e) => log::warn!(error = %e, "Initial user fetch failed"),
    }
    match client.fetch_rules().await {
        Ok(rules) => registry.set_rules(rules).await,
        Err(e) => log::warn!(error = %e, "Initial rule fetch failed"),
    }

    log::info!(
        users = registry.user_count().await,
        rules = registry.rules().await.len(),
        "Initial sync complete"
    );

    let collector = Arc::new(UsageCollector::new());

    // Start background tasks
    let cancel_token = CancellationToken::new();
    let task_config = TaskConfig::new(
        cli.update_interval,
        cli.report_interval,
        cli.status_interval,
    );
    let handle = BackgroundTasks::new(
        task_config,
        Arc::clone(&client),
        Arc::clone(&registry),
        Arc::clone(&collector),
        cancel_token.clone(),
    )
    .start();

    wait_for_signal().await?;

    // Report task flushes pending usage on cancel
    handle.shutdown().await;
    log::info!("Shutdown complete");
    Ok(())
}

async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT")?;
        let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM")?;

        tokio::select! {
            _ = sigint.recv() => {
                log::info!("SIGINT received, shutting down...");
            }
            _ = sigterm.recv() => {
                log::info!("SIGTERM received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for ctrl-c")?;
        log::info!("Shutdown signal received...");
    }

    Ok(())
}
