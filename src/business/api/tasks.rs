//! Background tasks for periodic panel synchronization

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::client::PanelClient;
use super::registry::SyncRegistry;
use crate::business::status::StatusSampler;
use crate::error::PanelError;
use crate::logger::log;
use crate::stats::UsageCollector;

/// Format bytes into human-readable string (KB, MB, GB)
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2}GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2}KB", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

/// Background task configuration
#[derive(Debug, Clone)]
pub struct TaskConfig {
    /// Interval for fetching node info, users and rules
    pub update_interval: Duration,
    /// Interval for reporting online users, traffic and illegal events
    pub report_interval: Duration,
    /// Interval for reporting node status
    pub status_interval: Duration,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(60),
            report_interval: Duration::from_secs(60),
            status_interval: Duration::from_secs(60),
        }
    }
}

impl TaskConfig {
    /// Create task config from durations
    pub fn new(update: Duration, report: Duration, status: Duration) -> Self {
        Self {
            update_interval: update,
            report_interval: report,
            status_interval: status,
        }
    }
}

/// Background tasks manager
pub struct BackgroundTasks {
    config: TaskConfig,
    client: Arc<PanelClient>,
    registry: Arc<SyncRegistry>,
    collector: Arc<UsageCollector>,
    shutdown: CancellationToken,
}

/// Handle for spawned background tasks
pub struct BackgroundTasksHandle {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasksHandle {
    /// Stop all background tasks and wait for them to complete
    pub async fn shutdown(self) {
        log::info!("Stopping background tasks...");
        self.shutdown.cancel();

        for (i, handle) in self.handles.into_iter().enumerate() {
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(Ok(())) => {
                    log::debug!(task = i, "Background task stopped");
                }
                Ok(Err(e)) => {
                    log::warn!(task = i, error = %e, "Background task panicked");
                }
                Err(_) => {
                    log::warn!(task = i, "Background task shutdown timeout");
                }
            }
        }
        log::info!("Background tasks stopped");
    }
}

impl BackgroundTasks {
    /// Create a new background tasks manager
    pub fn new(
        config: TaskConfig,
        client: Arc<PanelClient>,
        registry: Arc<SyncRegistry>,
        collector: Arc<UsageCollector>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            client,
            registry,
            collector,
            shutdown,
        }
    }

    /// Start all background tasks and return a handle for shutdown
    pub fn start(self) -> BackgroundTasksHandle {
        let handles = vec![
            self.start_update_task(),
            self.start_report_task(),
            self.start_status_task(),
        ];

        log::info!("Background tasks started");

        BackgroundTasksHandle {
            shutdown: self.shutdown,
            handles,
        }
    }

    /// Start the node info / users / rules update task
    fn start_update_task(&self) -> JoinHandle<()> {
        let client = Arc::clone(&self.client);
        let registry = Arc::clone(&self.registry);
        let interval_duration = self.config.update_interval;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut interval = interval(interval_duration);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // Startup already performed the first sync
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        sync_once(&client, &registry).await;
                    }
                    _ = shutdown.cancelled() => {
                        log::debug!("Update task shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Start the usage report task
    fn start_report_task(&self) -> JoinHandle<()> {
        let client = Arc::clone(&self.client);
        let collector = Arc::clone(&self.collector);
        let interval_duration = self.config.report_interval;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut interval = interval(interval_duration);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately; nothing has been collected yet
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        report_once(&client, &collector).await;
                    }
                    _ = shutdown.cancelled() => {
                        log::debug!("Report task shutting down");
                        // Final report before shutdown
                        report_once(&client, &collector).await;
                        break;
                    }
                }
            }
        })
    }

    /// Start the status report task
    fn start_status_task(&self) -> JoinHandle<()> {
        let client = Arc::clone(&self.client);
        let interval_duration = self.config.status_interval;
        let shutdown = self.shutdown.clone();
        let sampler = StatusSampler::new();

        tokio::spawn(async move {
            let mut interval = interval(interval_duration);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match client.report_status(&sampler.sample()).await {
                            Ok(true) => log::debug!("Status reported"),
                            Ok(false) => {}
                            Err(e) => log::warn!(error = %e, "Failed to report status"),
                        }
                    }
                    _ = shutdown.cancelled() => {
                        log::debug!("Status task shutting down");
                        break;
                    }
                }
            }
        })
    }
}

/// Log a fetch failure; not-modified is routine
fn log_fetch_error(what: &str, e: &PanelError) {
    if e.is_not_modified() {
        log::debug!(resource = what, "Not modified, keeping previous data");
    } else {
        log::warn!(resource = what, error = %e, "Fetch failed, keeping previous data");
    }
}

/// Fetch node info, users and rules once and update the registry.
///
/// Each resource is independent: a failure keeps the previous value of that resource only.
pub async fn sync_once(client: &PanelClient, registry: &SyncRegistry) {
    match client.fetch_node_info().await {
        Ok(node) => {
            registry.set_node(node).await;
        }
        Err(e) => log_fetch_error("node", &e),
    }

    match client.fetch_users().await {
        Ok(users) => {
            let total = users.len();
            let diff = registry.update_users(&users).await;
            log::debug!(
                total = total,
                added = diff.added,
                removed = diff.removed,
                changed = diff.changed,
                "Users synchronized"
            );
        }
        Err(e) => log_fetch_error("users", &e),
    }

    match client.fetch_rules().await {
        Ok(rules) => registry.set_rules(rules).await,
        Err(e) => log_fetch_error("rules", &e),
    }
}

/// Drain the collector and send every report once
pub async fn report_once(client: &PanelClient, collector: &UsageCollector) {
    let snapshot = collector.drain();

    // Always sent so the next reconciliation sees this period's counts
    if let Err(e) = client.report_online_users(&snapshot.online).await {
        log::warn!(error = %e, "Failed to report online users");
    }

    if !snapshot.traffic.is_empty() {
        let count = snapshot.traffic.len();
        let total_upload: u64 = snapshot.traffic.iter().map(|t| t.upload).sum();
        let total_download: u64 = snapshot.traffic.iter().map(|t| t.download).sum();
        match client.report_traffic(&snapshot.traffic).await {
            Ok(()) => log::info!(
                users = count,
                upload = %format_bytes(total_upload),
                download = %format_bytes(total_download),
                "Traffic reported"
            ),
            Err(e) => log::warn!(error = %e, "Failed to report traffic"),
        }
    }

    if let Err(e) = client.report_illegal(&snapshot.illegal).await {
        log::warn!(error = %e, "Failed to report illegal behaviors");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_config_default() {
        let config = TaskConfig::default();
        assert_eq!(config.update_interval, Duration::from_secs(60));
        assert_eq!(config.report_interval, Duration::from_secs(60));
        assert_eq!(config.status_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_task_config_new() {
        let config = TaskConfig::new(
            Duration::from_secs(30),
            Duration::from_secs(45),
            Duration::from_secs(120),
        );
        assert_eq!(config.update_interval, Duration::from_secs(30));
        assert_eq!(config.report_interval, Duration::from_secs(45));
        assert_eq!(config.status_interval, Duration::from_secs(120));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.00KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00MB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.00GB");
    }
}
