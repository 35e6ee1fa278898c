//! Panel client: cache-aware fetches and reports against the panel's mu API

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::cache::{EtagCache, ResourceKind};
use super::gateway::{HttpGateway, PanelGateway, PanelRequest, PanelResponse};
use super::models::{
    decode_rows, Envelope, IllegalItem, NodeInfoResponse, OnlineUser, PostData, RuleItem,
    SystemLoad, UserResponse, UserTraffic,
};
use super::node::{resolve_node, NodeDescriptor, NodeSettings, NodeType};
use super::quota::{count_online, CarryOver, QuotaPolicy, UserInfo};
use super::rules::{load_local_rules, merge_rules, DetectRule};
use super::version::needs_status_report;
use super::UserId;
use crate::business::status::NodeStatus;
use crate::config::CliArgs;
use crate::error::{PanelError, Result};
use crate::logger::log;

/// `ret` value of a successful envelope
const RET_OK: i64 = 1;

/// Configuration for the panel client
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Panel base URL (e.g., "https://panel.example.com")
    pub api_host: String,
    /// mu key, sent as query parameter
    pub api_key: String,
    pub node_id: u32,
    pub node_type: NodeType,
    /// Request timeout
    pub api_timeout: Duration,
    /// Extra attempts on transport failure
    pub retry_count: u32,
    /// Global speed limit override in Mbps, 0 = unset
    pub speed_limit: f64,
    /// Global device limit override, 0 = unset
    pub device_limit: u32,
    /// Local detect rule file
    pub rule_list_path: Option<PathBuf>,
    /// Log raw panel responses
    pub debug: bool,
}

impl PanelConfig {
    /// Create PanelConfig from CLI args
    pub fn from_cli(cli: &CliArgs) -> Result<Self> {
        Ok(Self {
            api_host: cli.api_host.clone(),
            api_key: cli.api_key.clone(),
            node_id: cli.node_id,
            node_type: cli.node_type.parse()?,
            api_timeout: cli.api_timeout,
            retry_count: cli.retry_count,
            speed_limit: cli.speed_limit,
            device_limit: cli.device_limit,
            rule_list_path: cli.rule_list_path.clone(),
            debug: cli.debug,
        })
    }

    fn node_settings(&self) -> NodeSettings {
        NodeSettings {
            node_id: self.node_id,
            node_type: self.node_type,
            speed_limit: self.speed_limit,
        }
    }

    fn quota_policy(&self) -> QuotaPolicy {
        QuotaPolicy {
            speed_limit: self.speed_limit,
            device_limit: self.device_limit,
        }
    }
}

/// Panel client handling every remote operation of one node
pub struct PanelClient {
    gateway: Arc<dyn PanelGateway>,
    config: PanelConfig,
    etags: EtagCache,
    carry_over: CarryOver,
    local_rules: Vec<DetectRule>,
    version: RwLock<String>,
}

impl PanelClient {
    /// Create a client over the HTTP gateway
    pub fn new(config: PanelConfig) -> Result<Self> {
        let gateway = HttpGateway::new(
            &config.api_host,
            &config.api_key,
            config.api_timeout,
            config.retry_count,
            config.debug,
        )?;
        Ok(Self::with_gateway(config, Arc::new(gateway)))
    }

    /// Create a client over any gateway
    pub fn with_gateway(config: PanelConfig, gateway: Arc<dyn PanelGateway>) -> Self {
        let local_rules = load_local_rules(config.rule_list_path.as_deref());
        Self {
            gateway,
            config,
            etags: EtagCache::new(),
            carry_over: CarryOver::new(),
            local_rules,
            version: RwLock::new(String::new()),
        }
    }

    /// Get panel config
    pub fn panel_config(&self) -> &PanelConfig {
        &self.config
    }

    /// Panel version from the last node info, empty until known
    pub async fn panel_version(&self) -> String {
        self.version.read().await.clone()
    }

    /// Online counts waiting for the next user reconciliation
    pub fn pending_online_counts(&self) -> HashMap<UserId, usize> {
        self.carry_over.snapshot()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.gateway.base_url(), path)
    }

    fn node_info_path(&self) -> String {
        format!("/mod_mu/nodes/{}/info", self.config.node_id)
    }

    /// Validate status and envelope of a panel response
    fn parse_envelope(&self, path: &str, response: &PanelResponse) -> Result<Envelope> {
        if response.status >= 400 {
            return Err(PanelError::Protocol {
                url: self.url(path),
                status: response.status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }

        let envelope: Envelope = serde_json::from_slice(&response.body)
            .map_err(|e| PanelError::Decode(format!("{}: {}", self.url(path), e)))?;

        if envelope.ret != RET_OK {
            return Err(PanelError::Protocol {
                url: self.url(path),
                status: response.status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }
        Ok(envelope)
    }

    /// Conditional GET. Returns the envelope and the response token, which the caller commits
    /// once the payload has been fully processed.
    async fn fetch(
        &self,
        kind: ResourceKind,
        request: PanelRequest,
    ) -> Result<(Envelope, Option<String>)> {
        let path = request.path.clone();
        let request = request.if_none_match(self.etags.get(kind));
        let response = self.gateway.execute(request).await?;

        if response.status == 304 {
            return Err(PanelError::NotModified(kind));
        }

        let envelope = self.parse_envelope(&path, &response)?;
        Ok((envelope, response.etag))
    }

    fn commit_etag(&self, kind: ResourceKind, token: Option<String>) {
        if self.etags.update(kind, token.as_deref()) {
            log::debug!(kind = %kind, etag = ?token, "Cache token updated");
        }
    }

    async fn post<T: serde::Serialize>(&self, path: &str, query_node: bool, data: T) -> Result<()> {
        let body = serde_json::to_value(PostData { data })?;
        let mut request = PanelRequest::post(path, body);
        if query_node {
            request = request.query("node_id", self.config.node_id);
        }

        let response = self.gateway.execute(request).await?;
        self.parse_envelope(path, &response)?;
        Ok(())
    }

    /// Fetch and resolve the node descriptor
    pub async fn fetch_node_info(&self) -> Result<NodeDescriptor> {
        let path = self.node_info_path();
        let (envelope, etag) = self
            .fetch(ResourceKind::Node, PanelRequest::get(path.as_str()))
            .await?;

        let info: NodeInfoResponse = serde_json::from_value(envelope.data)
            .map_err(|e| PanelError::Decode(format!("node info: {}", e)))?;

        let node = resolve_node(&self.config.node_settings(), &info).map_err(|e| {
            log::error!(node_id = self.config.node_id, error = %e, "Failed to parse node info");
            e
        })?;

        *self.version.write().await = info.version.clone();
        self.commit_etag(ResourceKind::Node, etag);

        log::info!(
            node_id = node.node_id,
            node_type = %node.node_type,
            port = node.port,
            network = %node.transport_protocol,
            tls = node.enable_tls,
            panel_version = %info.version,
            "Node info fetched"
        );
        Ok(node)
    }

    /// Fetch the user list and reconcile quotas against the last online report
    pub async fn fetch_users(&self) -> Result<Vec<UserInfo>> {
        let request = PanelRequest::get("/mod_mu/users").query("node_id", self.config.node_id);
        let (envelope, etag) = self.fetch(ResourceKind::Users, request).await?;

        let rows: Vec<UserResponse> = decode_rows("user", envelope.data)?;
        let total = rows.len();
        let users = self.carry_over.reconcile(&rows, &self.config.quota_policy());
        self.commit_etag(ResourceKind::Users, etag);

        log::debug!(
            total = total,
            authorized = users.len(),
            excluded = total - users.len(),
            "Users fetched"
        );
        Ok(users)
    }

    /// Fetch remote detect rules, prefixed by the local ones
    pub async fn fetch_rules(&self) -> Result<Vec<DetectRule>> {
        let request = PanelRequest::get("/mod_mu/func/detect_rules");
        let (envelope, etag) = self.fetch(ResourceKind::Rules, request).await?;

        let items: Vec<RuleItem> = decode_rows("rule", envelope.data)?;
        let rules = merge_rules(&self.local_rules, items);
        self.commit_etag(ResourceKind::Rules, etag);

        log::debug!(
            local = self.local_rules.len(),
            total = rules.len(),
            "Detect rules fetched"
        );
        Ok(rules)
    }

    /// Report online (user, ip) pairs and record per-user counts for the next reconciliation.
    ///
    /// The counts replace the previous report before the request is sent; the lock is not held
    /// across the network call.
    pub async fn report_online_users(&self, online: &[OnlineUser]) -> Result<()> {
        self.carry_over.replace(count_online(online));

        self.post("/mod_mu/users/aliveip", true, online).await?;
        log::debug!(count = online.len(), "Online users reported");
        Ok(())
    }

    /// Report per-user traffic deltas
    pub async fn report_traffic(&self, traffic: &[UserTraffic]) -> Result<()> {
        if traffic.is_empty() {
            log::debug!("No traffic to report");
            return Ok(());
        }

        self.post("/mod_mu/users/traffic", true, traffic).await?;
        log::debug!(count = traffic.len(), "Traffic reported");
        Ok(())
    }

    /// Report detect rule hits
    pub async fn report_illegal(&self, items: &[IllegalItem]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        self.post("/mod_mu/users/detectlog", true, items).await?;
        log::info!(count = items.len(), "Illegal behaviors reported");
        Ok(())
    }

    /// Report node status; newer panels derive it themselves and this is a no-op there.
    ///
    /// Returns whether a report was sent.
    pub async fn report_status(&self, status: &NodeStatus) -> Result<bool> {
        let version = self.panel_version().await;
        if !needs_status_report(&version) {
            log::debug!(panel_version = %version, "Status report not needed");
            return Ok(false);
        }

        let load = SystemLoad {
            uptime: status.uptime.to_string(),
            load: status.load_string(),
        };
        let path = self.node_info_path();
        let body = serde_json::to_value(&load)?;

        let response = self
            .gateway
            .execute(PanelRequest::post(path.as_str(), body))
            .await?;
        self.parse_envelope(&path, &response)?;

        log::debug!(uptime = status.uptime, load = %load.load, "Status reported");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PanelConfig {
        PanelConfig {
            api_host: "https://panel.example.com".to_string(),
            api_key: "key".to_string(),
            node_id: 1,
            node_type: NodeType::Trojan,
            api_timeout: Duration::from_secs(5),
            retry_count: 0,
            speed_limit: 0.0,
            device_limit: 0,
            rule_list_path: None,
            debug: false,
        }
    }

    #[test]
    fn test_node_settings_from_config() {
        let mut cfg = config();
        cfg.speed_limit = 10.0;
        let settings = cfg.node_settings();
        assert_eq!(settings.node_id, 1);
        assert_eq!(settings.node_type, NodeType::Trojan);
        assert_eq!(settings.speed_limit, 10.0);
    }

    #[test]
    fn test_quota_policy_from_config() {
        let mut cfg = config();
        cfg.device_limit = 3;
        let policy = cfg.quota_policy();
        assert_eq!(policy.device_limit, 3);
        assert_eq!(policy.speed_limit, 0.0);
    }

    #[tokio::test]
    async fn test_new_client_has_no_version() {
        let client = PanelClient::new(config()).unwrap();
        assert_eq!(client.panel_version().await, "");
        assert!(client.pending_online_counts().is_empty());
        assert_eq!(client.panel_config().node_id, 1);
    }
}
