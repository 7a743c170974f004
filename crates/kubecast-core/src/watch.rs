//! Glue between the Kubernetes watch layer and the broadcast hub.
//!
//! Informer callbacks either call [`EventSink::publish`] directly, or push
//! [`ResourceEvent`]s into a [`WatchSender`] whose receiving end is drained
//! by [`forward_events`]. Both paths keep the order in which events were
//! produced.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::RelayResult;
use crate::message::{EventKind, Message, Payload, ResourceKind};

/// Destination for resource-change messages.
pub trait EventSink: Send + Sync {
    /// Hand a message over for delivery. Never blocks on slow consumers.
    fn submit(&self, message: Message);

    /// Validate a `(resource, event, payload)` tuple and submit it.
    fn publish(&self, resource: ResourceKind, event: EventKind, payload: Payload) -> RelayResult<()> {
        let message = Message::new(resource, event, payload)?;
        self.submit(message);
        Ok(())
    }
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn submit(&self, message: Message) {
        (**self).submit(message)
    }
}

/// One notification as produced by an informer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEvent {
    pub resource: ResourceKind,
    pub event: EventKind,
    #[serde(default)]
    pub payload: Payload,
}

impl ResourceEvent {
    pub fn new(resource: ResourceKind, event: EventKind, payload: Payload) -> Self {
        Self {
            resource,
            event,
            payload,
        }
    }

    pub fn into_message(self) -> RelayResult<Message> {
        Message::new(self.resource, self.event, self.payload)
    }
}

/// Returned when the feed cannot take another event.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedError {
    #[error("watch feed is full")]
    Full,

    #[error("watch feed is closed")]
    Closed,
}

/// Producer half of a watch feed, cheap to clone into informer callbacks.
#[derive(Debug, Clone)]
pub struct WatchSender {
    tx: mpsc::Sender<ResourceEvent>,
}

impl WatchSender {
    /// Queue an event without blocking the calling thread.
    pub fn send(&self, event: ResourceEvent) -> Result<(), FeedError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => FeedError::Full,
            mpsc::error::TrySendError::Closed(_) => FeedError::Closed,
        })
    }
}

/// Create a bounded watch feed.
pub fn watch_channel(capacity: usize) -> (WatchSender, mpsc::Receiver<ResourceEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (WatchSender { tx }, rx)
}

/// Forward every event from `rx` into `sink`, in order, until the feed closes.
///
/// Events that do not form a valid message are logged and skipped.
/// Returns the number of messages submitted.
pub async fn forward_events<S>(mut rx: mpsc::Receiver<ResourceEvent>, sink: S) -> usize
where
    S: EventSink,
{
    let mut forwarded = 0;
    while let Some(event) = rx.recv().await {
        match event.into_message() {
            Ok(message) => {
                debug!(message_type = %message.message_type(), "Forwarding watch event");
                sink.submit(message);
                forwarded += 1;
            }
            Err(e) => warn!(error = %e, "Dropping invalid watch event"),
        }
    }
    debug!(forwarded, "Watch feed closed");
    forwarded
}
