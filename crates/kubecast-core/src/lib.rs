//! Kubecast Core Library
//!
//! Message model, configuration and watch-layer glue shared by the hub,
//! the web server and the CLI.

pub mod config;
pub mod error;
pub mod message;
pub mod notifier;
pub mod watch;

pub use config::{HubConfig, OverflowPolicy, RelayConfig, ServerConfig, WebSocketConfig};
pub use error::{RelayError, RelayResult};
pub use message::{EventKind, Message, MessageType, Payload, ResourceKind};
pub use watch::{EventSink, ResourceEvent};
