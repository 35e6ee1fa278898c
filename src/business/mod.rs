//! Business logic implementations
//!
//! This module contains the panel-facing pieces:
//! - API integration (fetches, quota reconciliation, reports, background polling)
//! - Node status sampling

pub mod api;
pub mod status;

pub use api::{BackgroundTasks, PanelClient, PanelConfig, SyncRegistry, TaskConfig};
pub use status::{NodeStatus, StatusSampler};
