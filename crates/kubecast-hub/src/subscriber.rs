//! Per-connection delivery endpoint.
//!
//! A [`Subscription`] owns the receiving end of one subscriber's outbox.
//! Its lifecycle is `Active -> Closing -> Closed`. The first caller to
//! request `Closing` wins, records the reason and removes the subscriber
//! from the hub pool; every later request is a no-op.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

use kubecast_core::Message;

use crate::hub::Hub;

/// Opaque subscriber identity, never reused within a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Active,
    Closing,
    Closed,
}

const ACTIVE: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Why a subscriber left the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent a close frame or the stream ended.
    PeerClosed,
    /// No inbound frame within the read deadline.
    ReadTimeout,
    /// Read or write failure on the transport.
    TransportError,
    /// Outbox overflowed under the disconnect policy.
    Overflow,
    /// Removed through [`Hub::unsubscribe`].
    Unsubscribed,
    /// Server-side shutdown.
    Shutdown,
    /// Subscription dropped while still active.
    Released,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::ReadTimeout => "read_timeout",
            Self::TransportError => "transport_error",
            Self::Overflow => "overflow",
            Self::Unsubscribed => "unsubscribed",
            Self::Shutdown => "shutdown",
            Self::Released => "released",
        }
    }

    /// Whether queued messages should be abandoned rather than drained.
    ///
    /// The peer can no longer be relied on to read them.
    pub fn abandons_outbox(&self) -> bool {
        matches!(
            self,
            Self::PeerClosed | Self::ReadTimeout | Self::TransportError
        )
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared by the hub pool entry and the connection side.
#[derive(Debug)]
pub(crate) struct SubscriberShared {
    id: SubscriberId,
    state: AtomicU8,
    reason: Mutex<Option<CloseReason>>,
}

impl SubscriberShared {
    pub(crate) fn new(id: SubscriberId) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: AtomicU8::new(ACTIVE),
            reason: Mutex::new(None),
        })
    }

    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state.load(Ordering::Acquire) == ACTIVE
    }

    pub(crate) fn state(&self) -> SubscriberState {
        match self.state.load(Ordering::Acquire) {
            ACTIVE => SubscriberState::Active,
            CLOSING => SubscriberState::Closing,
            _ => SubscriberState::Closed,
        }
    }

    /// Move `Active -> Closing`. Returns true for the single winning caller.
    pub(crate) fn begin_closing(&self, reason: CloseReason) -> bool {
        let mut slot = self.reason.lock();
        let won = self
            .state
            .compare_exchange(ACTIVE, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            *slot = Some(reason);
        }
        won
    }

    pub(crate) fn mark_closed(&self) {
        self.state.store(CLOSED, Ordering::Release);
    }

    pub(crate) fn close_reason(&self) -> Option<CloseReason> {
        *self.reason.lock()
    }
}

/// Cloneable handle that can force a subscription into `Closing`.
#[derive(Debug, Clone)]
pub struct SubscriptionCloser {
    shared: Arc<SubscriberShared>,
    hub: Weak<Hub>,
}

impl SubscriptionCloser {
    pub fn id(&self) -> SubscriberId {
        self.shared.id()
    }

    pub fn state(&self) -> SubscriberState {
        self.shared.state()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.shared.close_reason()
    }

    /// Request `Closing` and leave the pool.
    ///
    /// Returns false if the subscription was already closing, in which case
    /// nothing happens.
    pub fn close(&self, reason: CloseReason) -> bool {
        if !self.shared.begin_closing(reason) {
            return false;
        }
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.shared.id());
        }
        true
    }
}

/// Receiving side of one subscriber, owned by its connection adapter.
#[derive(Debug)]
pub struct Subscription {
    outbox: mpsc::Receiver<Arc<Message>>,
    closer: SubscriptionCloser,
}

impl Subscription {
    pub(crate) fn new(
        outbox: mpsc::Receiver<Arc<Message>>,
        shared: Arc<SubscriberShared>,
        hub: Weak<Hub>,
    ) -> Self {
        Self {
            outbox,
            closer: SubscriptionCloser { shared, hub },
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.closer.id()
    }

    pub fn state(&self) -> SubscriberState {
        self.closer.state()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.closer.close_reason()
    }

    pub fn closer(&self) -> SubscriptionCloser {
        self.closer.clone()
    }

    pub fn close(&self, reason: CloseReason) -> bool {
        self.closer.close(reason)
    }

    /// Wait for the next queued message.
    ///
    /// Returns `None` once the subscriber has left the pool and everything
    /// enqueued before that has been taken.
    pub async fn next(&mut self) -> Option<Arc<Message>> {
        self.outbox.recv().await
    }

    /// Take the next queued message without waiting.
    pub fn try_next(&mut self) -> Option<Arc<Message>> {
        self.outbox.try_recv().ok()
    }

    /// Number of messages waiting in the outbox.
    pub fn queued(&self) -> usize {
        self.outbox.len()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.closer.close(CloseReason::Released);
        self.closer.shared.mark_closed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubecast_core::{EventKind, HubConfig, ResourceKind};

    #[test]
    fn test_close_transition_happens_once() {
        let hub = Hub::new(&HubConfig::default());
        let subscription = hub.subscribe();
        let read_side = subscription.closer();
        let write_side = subscription.closer();

        assert!(read_side.close(CloseReason::ReadTimeout));
        assert!(!write_side.close(CloseReason::TransportError));
        assert!(!subscription.close(CloseReason::PeerClosed));

        assert_eq!(subscription.state(), SubscriberState::Closing);
        assert_eq!(subscription.close_reason(), Some(CloseReason::ReadTimeout));
        assert_eq!(hub.pool_size(), 0);
    }

    #[test]
    fn test_drop_marks_closed_and_unsubscribes() {
        let hub = Hub::new(&HubConfig::default());
        let subscription = hub.subscribe();
        let closer = subscription.closer();
        assert_eq!(hub.pool_size(), 1);

        drop(subscription);

        assert_eq!(hub.pool_size(), 0);
        assert_eq!(closer.state(), SubscriberState::Closed);
        assert_eq!(closer.close_reason(), Some(CloseReason::Released));
        // A closed handle cannot be reopened.
        assert!(!closer.close(CloseReason::Shutdown));
    }

    #[tokio::test]
    async fn test_queued_messages_survive_close() {
        let hub = Hub::new(&HubConfig::default());
        let mut subscription = hub.subscribe();

        hub.fan_out(Message::new(ResourceKind::Task, EventKind::Created, serde_json::Value::Null).unwrap());
        hub.fan_out(Message::new(ResourceKind::Task, EventKind::Deleted, serde_json::Value::Null).unwrap());
        assert_eq!(subscription.queued(), 2);

        subscription.close(CloseReason::Shutdown);
        hub.fan_out(Message::new(ResourceKind::Secret, EventKind::Created, serde_json::Value::Null).unwrap());

        let first = subscription.next().await.unwrap();
        let second = subscription.next().await.unwrap();
        assert_eq!(first.message_type().to_string(), "TaskCreated");
        assert_eq!(second.message_type().to_string(), "TaskDeleted");
        assert!(subscription.next().await.is_none());
    }

    #[test]
    fn test_abandon_policy() {
        assert!(CloseReason::PeerClosed.abandons_outbox());
        assert!(CloseReason::ReadTimeout.abandons_outbox());
        assert!(CloseReason::TransportError.abandons_outbox());
        assert!(!CloseReason::Shutdown.abandons_outbox());
        assert!(!CloseReason::Overflow.abandons_outbox());
    }

    #[test]
    fn test_ids_are_unique() {
        let hub = Hub::new(&HubConfig::default());
        let a = hub.subscribe();
        let b = hub.subscribe();
        drop(a);
        let c = hub.subscribe();
        assert_ne!(b.id(), c.id());
        assert_eq!(c.id().to_string(), "sub-3");
    }
}
