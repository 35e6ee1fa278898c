//! Node descriptor resolution from the panel's node info

use std::fmt;
use std::str::FromStr;

use super::models::{CustomConfig, NodeInfoResponse, RealityOpts};
use super::quota::resolve_speed_limit;
use crate::error::{PanelError, Result};

/// Proxy protocol served by the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Shadowsocks,
    Shadowsocks2022,
    V2ray,
    Trojan,
    Http,
    ShadowsocksPlugin,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Shadowsocks => "Shadowsocks",
            NodeType::Shadowsocks2022 => "Shadowsocks2022",
            NodeType::V2ray => "V2ray",
            NodeType::Trojan => "Trojan",
            NodeType::Http => "Http",
            NodeType::ShadowsocksPlugin => "Shadowsocks-Plugin",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "shadowsocks" => Ok(NodeType::Shadowsocks),
            "shadowsocks2022" => Ok(NodeType::Shadowsocks2022),
            "v2ray" => Ok(NodeType::V2ray),
            "trojan" => Ok(NodeType::Trojan),
            "http" => Ok(NodeType::Http),
            "shadowsocks-plugin" => Ok(NodeType::ShadowsocksPlugin),
            _ => Err(PanelError::Config(format!("unsupported node type: {}", s))),
        }
    }
}

/// REALITY settings, zeroed when the panel has none
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RealityConfig {
    pub dest: String,
    pub proxy_protocol_ver: u64,
    pub server_names: Vec<String>,
    pub private_key: String,
    pub min_client_ver: String,
    pub max_client_ver: String,
    pub max_time_diff: u64,
    pub short_ids: Vec<String>,
}

impl From<RealityOpts> for RealityConfig {
    fn from(r: RealityOpts) -> Self {
        Self {
            dest: r.dest,
            proxy_protocol_ver: r.proxy_protocol_ver,
            server_names: r.server_names,
            private_key: r.private_key,
            min_client_ver: r.min_client_ver,
            max_client_ver: r.max_client_ver,
            max_time_diff: r.max_time_diff,
            short_ids: r.short_ids,
        }
    }
}

/// Node-local settings that shape resolution
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSettings {
    pub node_id: u32,
    pub node_type: NodeType,
    /// Global speed override in Mbps, 0 = unset
    pub speed_limit: f64,
}

/// Normalized node configuration for one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDescriptor {
    pub node_type: NodeType,
    pub node_id: u32,
    pub port: u16,
    /// Bytes per second, 0 = unlimited
    pub speed_limit: u64,
    pub transport_protocol: String,
    pub enable_tls: bool,
    pub enable_vless: bool,
    pub vless_flow: String,
    pub cipher_method: String,
    pub server_key: String,
    pub host: String,
    pub path: String,
    pub service_name: String,
    pub header: Option<serde_json::Value>,
    pub enable_reality: bool,
    pub reality: RealityConfig,
    pub route_dns: Vec<String>,
}

/// Build a descriptor from the panel's node info.
///
/// An empty `custom_config` or an unusable port is a configuration error for this cycle.
pub fn resolve_node(settings: &NodeSettings, info: &NodeInfoResponse) -> Result<NodeDescriptor> {
    let config = parse_custom_config(info.custom_config.as_ref())?;
    let port = parse_port(&config.offset_port_node)?;
    let speed_limit = resolve_speed_limit(settings.speed_limit, info.speed_limit);

    let network = |default: &str| {
        if config.network.is_empty() {
            default.to_string()
        } else {
            config.network.clone()
        }
    };

    let (transport_protocol, enable_tls, enable_vless) = match settings.node_type {
        NodeType::Shadowsocks | NodeType::Shadowsocks2022 => ("tcp".to_string(), false, false),
        NodeType::V2ray => (
            config.network.clone(),
            matches!(config.security.as_str(), "tls" | "xtls"),
            config.enable_vless == "1",
        ),
        NodeType::Trojan => (network("tcp"), true, false),
        NodeType::Http | NodeType::ShadowsocksPlugin => (network("tcp"), false, false),
    };

    let CustomConfig {
        host,
        method,
        path,
        header,
        servicename,
        flow,
        server_key,
        enable_reality,
        reality_opts,
        route_dns,
        ..
    } = config;

    Ok(NodeDescriptor {
        node_type: settings.node_type,
        node_id: settings.node_id,
        port,
        speed_limit,
        transport_protocol,
        enable_tls,
        enable_vless,
        vless_flow: flow,
        cipher_method: method,
        server_key,
        host,
        path,
        service_name: servicename,
        header,
        enable_reality,
        reality: reality_opts.map(RealityConfig::from).unwrap_or_default(),
        route_dns,
    })
}

fn parse_custom_config(raw: Option<&serde_json::Value>) -> Result<CustomConfig> {
    let empty = || PanelError::Config("custom_config is empty".to_string());
    let invalid = |e: serde_json::Error| PanelError::Config(format!("custom_config format error: {}", e));

    match raw {
        None | Some(serde_json::Value::Null) => Err(empty()),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Err(empty()),
        Some(serde_json::Value::String(s)) => serde_json::from_str(s).map_err(invalid),
        Some(value) => serde_json::from_value(value.clone()).map_err(invalid),
    }
}

fn parse_port(raw: &serde_json::Value) -> Result<u16> {
    let parsed = match raw {
        serde_json::Value::String(s) => s.trim().parse::<u16>().ok(),
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        _ => None,
    };
    parsed.ok_or_else(|| PanelError::Config(format!("invalid offset_port_node: {}", raw)))
}
