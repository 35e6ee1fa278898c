//! Remote panel API integration
//!
//! This module handles:
//! - Conditional (ETag) fetches of node info, users and detect rules
//! - Protocol config resolution into a node descriptor
//! - Device/speed quota reconciliation with carry-over from the last online report
//! - Online, traffic, illegal and status reports
//! - Background polling tasks

mod cache;
mod client;
mod gateway;
mod models;
mod node;
mod quota;
mod registry;
mod rules;
mod tasks;
mod version;

/// User ID type used throughout the panel API
pub type UserId = i64;

pub use cache::{EtagCache, ResourceKind};
pub use client::{PanelClient, PanelConfig};
pub use gateway::{HttpGateway, Method, PanelGateway, PanelRequest, PanelResponse};
pub use models::{IllegalItem, OnlineUser, UserTraffic};
pub use node::{NodeDescriptor, NodeSettings, NodeType, RealityConfig};
pub use quota::{
    count_online, effective_device_limit, mbps_to_bytes_per_sec, CarryOver, QuotaPolicy, UserInfo,
};
pub use registry::{SyncRegistry, UserDiff};
pub use rules::{load_local_rules, merge_rules, parse_local_rules, DetectRule, LOCAL_RULE_ID};
pub use tasks::{report_once, sync_once, BackgroundTasks, BackgroundTasksHandle, TaskConfig};
pub use version::{compare_version, needs_status_report, STATUS_REPORT_BEFORE};
