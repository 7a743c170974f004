//! Hub-level counters for health reporting.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Aggregate counters across all subscribers (lifetime of the hub).
#[derive(Debug, Default)]
pub struct HubMetrics {
    total_subscribers: AtomicU64,
    messages_submitted: AtomicU64,
    messages_enqueued: AtomicU64,
    messages_dropped: AtomicU64,
    overflow_disconnects: AtomicU64,
}

impl HubMetrics {
    pub fn subscriber_added(&self) {
        self.total_subscribers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_submitted(&self) {
        self.messages_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_enqueued(&self, count: u64) {
        self.messages_enqueued.fetch_add(count, Ordering::Relaxed);
    }

    pub fn messages_dropped(&self, count: u64) {
        self.messages_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn overflow_disconnects(&self, count: u64) {
        self.overflow_disconnects.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HubMetricsSnapshot {
        HubMetricsSnapshot {
            total_subscribers: self.total_subscribers.load(Ordering::Relaxed),
            messages_submitted: self.messages_submitted.load(Ordering::Relaxed),
            messages_enqueued: self.messages_enqueued.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            overflow_disconnects: self.overflow_disconnects.load(Ordering::Relaxed),
        }
    }
}

/// Hub metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubMetricsSnapshot {
    pub total_subscribers: u64,
    pub messages_submitted: u64,
    pub messages_enqueued: u64,
    pub messages_dropped: u64,
    pub overflow_disconnects: u64,
}
