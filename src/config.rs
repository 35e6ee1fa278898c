//! Configuration module for the panel node synchronizer
//!
//! This module handles CLI argument parsing with environment variable support.
//! Node configuration itself is fetched from the panel, not from local files.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::business::api::NodeType;

/// Parse duration string (e.g., "60s", "2m", "1h") or plain seconds
fn parse_duration(s: &str) -> Result<Duration, String> {
    // Try parsing as humantime duration first (e.g., "60s", "2m", "1h30m")
    if let Ok(d) = humantime::parse_duration(s) {
        return Ok(d);
    }
    // Fall back to parsing as plain seconds
    s.parse::<u64>().map(Duration::from_secs).map_err(|_| {
        format!(
            "Invalid duration '{}'. Use formats like '60s', '2m', '1h' or plain seconds",
            s
        )
    })
}

/// CLI arguments for the node synchronizer
///
/// Supports environment variables with SSPANEL_NODE_ prefix
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "SSPanel node synchronizer")]
#[command(rename_all = "snake_case")]
pub struct CliArgs {
    /// Panel base URL (e.g., "https://panel.example.com")
    #[arg(long = "api_host", env = "SSPANEL_NODE_API_HOST")]
    pub api_host: String,

    /// Panel mu key
    #[arg(long = "api_key", env = "SSPANEL_NODE_API_KEY")]
    pub api_key: String,

    /// Node ID from the panel (required)
    #[arg(long = "node_id", env = "SSPANEL_NODE_NODE_ID")]
    pub node_id: u32,

    /// Node type: Shadowsocks, Shadowsocks2022, V2ray, Trojan, Http, Shadowsocks-Plugin
    #[arg(long = "node_type", env = "SSPANEL_NODE_NODE_TYPE", default_value = "V2ray")]
    pub node_type: String,

    /// Panel request timeout (e.g., "5s", default: 5s)
    #[arg(long = "api_timeout", env = "SSPANEL_NODE_API_TIMEOUT", default_value = "5s", value_parser = parse_duration)]
    pub api_timeout: Duration,

    /// Extra attempts for a request that failed in transport (default: 3)
    #[arg(long = "retry_count", env = "SSPANEL_NODE_RETRY_COUNT", default_value_t = 3)]
    pub retry_count: u32,

    /// Global speed limit in Mbps overriding the panel, 0 = use panel values
    #[arg(long = "speed_limit", env = "SSPANEL_NODE_SPEED_LIMIT", default_value_t = 0.0)]
    pub speed_limit: f64,

    /// Global device limit overriding the panel, 0 = use panel values
    #[arg(long = "device_limit", env = "SSPANEL_NODE_DEVICE_LIMIT", default_value_t = 0)]
    pub device_limit: u32,

    /// Local detect rule file, one regular expression per line
    #[arg(long = "rule_list_path", env = "SSPANEL_NODE_RULE_LIST_PATH")]
    pub rule_list_path: Option<PathBuf>,

    /// Interval for fetching node info, users and rules (default: 60s)
    #[arg(long = "update_interval", env = "SSPANEL_NODE_UPDATE_INTERVAL", default_value = "60s", value_parser = parse_duration)]
    pub update_interval: Duration,

    /// Interval for reporting online users, traffic and illegal events (default: 60s)
    #[arg(long = "report_interval", env = "SSPANEL_NODE_REPORT_INTERVAL", default_value = "60s", value_parser = parse_duration)]
    pub report_interval: Duration,

    /// Interval for reporting node status on older panels (default: 60s)
    #[arg(long = "status_interval", env = "SSPANEL_NODE_STATUS_INTERVAL", default_value = "60s", value_parser = parse_duration)]
    pub status_interval: Duration,

    /// Log mode: trace, debug, info, warn, error (default: info)
    #[arg(long = "log_mode", env = "SSPANEL_NODE_LOG_MODE", default_value = "info")]
    pub log_mode: String,

    /// Log raw panel responses
    #[arg(long, env = "SSPANEL_NODE_DEBUG", default_value_t = false)]
    pub debug: bool,
}

impl CliArgs {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the CLI arguments
    pub fn validate(&self) -> Result<()> {
        if self.api_host.is_empty() {
            return Err(anyhow!("Panel API host is required"));
        }
        if !self.api_host.starts_with("http://") && !self.api_host.starts_with("https://") {
            return Err(anyhow!(
                "Panel API host must start with http:// or https://: {}",
                self.api_host
            ));
        }
        if self.api_key.is_empty() {
            return Err(anyhow!("Panel API key is required"));
        }
        if self.node_id == 0 {
            return Err(anyhow!("Node ID must be a positive integer"));
        }
        self.node_type
            .parse::<NodeType>()
            .map_err(|e| anyhow!("{}", e))?;

        if self.speed_limit < 0.0 || self.speed_limit.is_nan() {
            return Err(anyhow!("speed_limit must not be negative"));
        }

        if let Some(ref path) = self.rule_list_path {
            if !path.exists() {
                return Err(anyhow!("Rule list file not found: {}", path.display()));
            }
        }

        // Validate intervals
        if self.update_interval.is_zero() {
            return Err(anyhow!("update_interval must be greater than 0"));
        }
        if self.report_interval.is_zero() {
            return Err(anyhow!("report_interval must be greater than 0"));
        }
        if self.status_interval.is_zero() {
            return Err(anyhow!("status_interval must be greater than 0"));
        }

        Ok(())
    }
}
