//! Kubecast Broadcast Hub
//!
//! In-process fan-out of resource-change messages to every connected
//! subscriber, with per-subscriber bounded outboxes.

pub mod hub;
pub mod metrics;
pub mod subscriber;

pub use hub::{Hub, SubmitReport};
pub use metrics::HubMetricsSnapshot;
pub use subscriber::{
    CloseReason, SubscriberId, SubscriberState, Subscription, SubscriptionCloser,
};
