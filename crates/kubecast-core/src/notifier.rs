//! HTTP notifier for out-of-process watchers.
//!
//! Watchers that do not share a process with the hub push events to a
//! running server through `POST /internal/notify`, which submits them to
//! every connected websocket client.

use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{RelayError, RelayResult};
use crate::message::Message;

/// Default relay server URL.
const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:9097";

/// Sends resource-change messages to a relay server over HTTP.
#[derive(Clone)]
pub struct EventNotifier {
    client: reqwest::Client,
    base_url: String,
}

impl EventNotifier {
    /// Create a notifier with default settings.
    ///
    /// Uses the `KUBECAST_URL` environment variable if set,
    /// otherwise defaults to `http://127.0.0.1:9097`.
    pub fn new() -> Self {
        let base_url =
            std::env::var("KUBECAST_URL").unwrap_or_else(|_| DEFAULT_RELAY_URL.to_string());
        Self::with_url(&base_url)
    }

    /// Create a notifier with a custom base URL.
    pub fn with_url(base_url: &str) -> Self {
        debug!(base_url = %base_url, "EventNotifier initialized");
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn notify_url(&self) -> String {
        format!("{}/internal/notify", self.base_url)
    }

    /// Push one message. Returns the server's JSON submit report.
    pub async fn notify(&self, message: &Message) -> RelayResult<serde_json::Value> {
        let url = self.notify_url();
        debug!(url = %url, message_type = %message.message_type(), "Sending resource notification");

        let response = self.client.post(&url).json(message).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                message_type = %message.message_type(),
                status_code = %status,
                "Resource notification rejected"
            );
            return Err(RelayError::NotifyRejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

impl Default for EventNotifier {
    fn default() -> Self {
        Self::new()
    }
}
