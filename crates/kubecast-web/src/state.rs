//! Application state.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::task::TaskTracker;

use kubecast_core::{Message, RelayConfig};
use kubecast_hub::{Hub, SubmitReport};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub config: Arc<RelayConfig>,
    pub started_at: DateTime<Utc>,
    /// Live websocket adapters, waited on during shutdown.
    pub connections: TaskTracker,
}

impl AppState {
    pub fn new(hub: Arc<Hub>, config: RelayConfig) -> Self {
        Self {
            hub,
            config: Arc::new(config),
            started_at: Utc::now(),
            connections: TaskTracker::new(),
        }
    }

    /// Broadcast a message to all WebSocket clients.
    pub fn broadcast(&self, message: Message) -> SubmitReport {
        self.hub.fan_out(message)
    }

    /// Server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}
