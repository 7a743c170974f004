//! Relay configuration.
//!
//! Values come from an optional TOML file, then `KUBECAST_*` environment
//! variables, then command-line flags (applied by the CLI).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{RelayError, RelayResult};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9097;
pub const DEFAULT_WEBSOCKET_PATH: &str = "/v1/websockets/resources";

/// What the hub does when a subscriber's outbox is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the slow subscriber; its connection closes and the client
    /// resyncs on reconnect.
    #[default]
    Disconnect,
    /// Skip the new message for that subscriber only.
    DropNewest,
}

impl std::str::FromStr for OverflowPolicy {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disconnect" => Ok(Self::Disconnect),
            "drop_newest" | "drop" => Ok(Self::DropNewest),
            other => Err(RelayError::config(format!(
                "unknown overflow policy '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Per-subscriber outbox capacity.
    pub outbox_capacity: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: 256,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    pub path: String,
    /// Idle read deadline; refreshed by every inbound frame.
    pub read_timeout_secs: u64,
    /// Server ping interval, 0 disables pings.
    pub heartbeat_secs: u64,
    pub write_timeout_secs: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_WEBSOCKET_PATH.to_string(),
            read_timeout_secs: 90,
            heartbeat_secs: 30,
            write_timeout_secs: 10,
        }
    }
}

impl WebSocketConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn heartbeat(&self) -> Option<Duration> {
        (self.heartbeat_secs > 0).then(|| Duration::from_secs(self.heartbeat_secs))
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub hub: HubConfig,
    pub websocket: WebSocketConfig,
}

impl RelayConfig {
    /// Load from an optional TOML file, apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> RelayResult<Self> {
        let mut config = match path {
            Some(path) => {
                debug!(path = %path.display(), "Loading configuration file");
                Self::from_toml(&std::fs::read_to_string(path)?)?
            }
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> RelayResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `KUBECAST_*` overrides using the given lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> RelayResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("KUBECAST_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("KUBECAST_PORT") {
            self.server.port = parse_env("KUBECAST_PORT", &port)?;
        }
        if let Some(capacity) = lookup("KUBECAST_OUTBOX_CAPACITY") {
            self.hub.outbox_capacity = parse_env("KUBECAST_OUTBOX_CAPACITY", &capacity)?;
        }
        if let Some(policy) = lookup("KUBECAST_OVERFLOW_POLICY") {
            self.hub.overflow_policy = policy.parse()?;
        }
        if let Some(secs) = lookup("KUBECAST_READ_TIMEOUT_SECS") {
            self.websocket.read_timeout_secs = parse_env("KUBECAST_READ_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = lookup("KUBECAST_HEARTBEAT_SECS") {
            self.websocket.heartbeat_secs = parse_env("KUBECAST_HEARTBEAT_SECS", &secs)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> RelayResult<()> {
        if self.hub.outbox_capacity == 0 {
            return Err(RelayError::config("hub.outbox_capacity must be greater than 0"));
        }
        if !self.websocket.path.starts_with('/') {
            return Err(RelayError::config(format!(
                "websocket.path must start with '/', got '{}'",
                self.websocket.path
            )));
        }
        if self.websocket.read_timeout_secs == 0 {
            return Err(RelayError::config(
                "websocket.read_timeout_secs must be greater than 0",
            ));
        }
        if self.websocket.write_timeout_secs == 0 {
            return Err(RelayError::config(
                "websocket.write_timeout_secs must be greater than 0",
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> RelayResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RelayError::config(format!("invalid value for {}: '{}'", key, value)))
}
