//! SSPanel node synchronizer
//!
//! Layout:
//! - `business/`: panel API integration, quota reconciliation, background polling, node status
//! - `stats`: usage collection drained by the report task
//! - `config`: CLI arguments with environment variable fallbacks
//! - `error`, `logger`: ambient error type and tracing setup

pub mod business;
pub mod config;
pub mod error;
pub mod logger;
pub mod stats;

pub use error::{PanelError, Result};
