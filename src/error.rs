use thiserror::Error;

use crate::business::api::ResourceKind;

/// Unified error type for panel synchronization
#[derive(Error, Debug)]
pub enum PanelError {
    /// The panel answered 304 for a conditional fetch; reuse the previous data
    #[error("{0} not modified")]
    NotModified(ResourceKind),

    /// Network or timeout failure while talking to the panel
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP status >= 400 or an envelope whose `ret` is not 1
    #[error("Request {url} failed with status {status}: {body}")]
    Protocol {
        url: String,
        status: u16,
        body: String,
    },

    /// Payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Node configuration is empty or unusable
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PanelError {
    /// Whether this is the "nothing changed" sentinel rather than a real failure
    pub fn is_not_modified(&self) -> bool {
        matches!(self, PanelError::NotModified(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, PanelError>;

impl From<reqwest::Error> for PanelError {
    fn from(err: reqwest::Error) -> Self {
        PanelError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for PanelError {
    fn from(err: serde_json::Error) -> Self {
        PanelError::Decode(err.to_string())
    }
}
