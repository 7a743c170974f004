//! Centralized error types for Kubecast.

use thiserror::Error;

use crate::message::{EventKind, ResourceKind};

/// Main error type for Kubecast operations.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Resource kind '{resource}' does not emit '{event}' events")]
    UnsupportedEvent {
        resource: ResourceKind,
        event: EventKind,
    },

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notification rejected with status {status}: {body}")]
    NotifyRejected { status: u16, body: String },
}

/// Result type for Kubecast operations.
pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
