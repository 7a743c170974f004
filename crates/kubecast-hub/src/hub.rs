//! Central broadcast hub.
//!
//! The pool maps subscriber ids to the sending half of each outbox. A
//! submit holds an upgradable read guard for its whole iteration, so:
//! - submits are serialized and every subscriber sees one total order,
//! - subscribe/unsubscribe (write guard) never interleave with a submit,
//! - `pool_size` (plain read guard) is never blocked by a submit.
//!
//! Outboxes are bounded. A full outbox never blocks the producer; the
//! configured [`OverflowPolicy`] decides whether the message is dropped for
//! that subscriber or the subscriber is evicted.

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, trace, warn};

use kubecast_core::{EventSink, HubConfig, Message, OverflowPolicy};

use crate::metrics::{HubMetrics, HubMetricsSnapshot};
use crate::subscriber::{CloseReason, SubscriberId, SubscriberShared, Subscription};

pub(crate) struct PoolEntry {
    outbox: mpsc::Sender<Arc<Message>>,
    shared: Arc<SubscriberShared>,
}

/// Outcome of one submit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReport {
    /// Subscribers the message was enqueued for.
    pub delivered: usize,
    /// Subscribers that skipped the message because their outbox was full.
    pub dropped: usize,
    /// Subscribers evicted because their outbox was full.
    pub disconnected: usize,
}

/// Process-wide fan-out point shared by the watch layer and every connection.
pub struct Hub {
    pool: RwLock<HashMap<SubscriberId, PoolEntry>>,
    next_id: AtomicU64,
    shut_down: AtomicBool,
    outbox_capacity: usize,
    overflow_policy: OverflowPolicy,
    metrics: HubMetrics,
}

impl Hub {
    pub fn new(config: &HubConfig) -> Arc<Self> {
        Arc::new(Self {
            pool: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            shut_down: AtomicBool::new(false),
            outbox_capacity: config.outbox_capacity.max(1),
            overflow_policy: config.overflow_policy,
            metrics: HubMetrics::default(),
        })
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow_policy
    }

    /// Register a new subscriber.
    ///
    /// After [`Hub::shutdown`] the returned subscription is already closing
    /// and its outbox yields nothing.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.outbox_capacity);
        let shared = SubscriberShared::new(id);
        let subscription = Subscription::new(rx, Arc::clone(&shared), Arc::downgrade(self));

        let mut pool = self.pool.write();
        if self.shut_down.load(Ordering::Acquire) {
            drop(pool);
            shared.begin_closing(CloseReason::Shutdown);
            debug!(subscriber = %id, "Hub is shut down, subscriber not registered");
            return subscription;
        }
        pool.insert(id, PoolEntry { outbox: tx, shared });
        let pool_size = pool.len();
        drop(pool);

        self.metrics.subscriber_added();
        debug!(subscriber = %id, pool_size, "Subscriber joined");
        subscription
    }

    /// Remove a subscriber from the pool. Unknown or already removed ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        if let Some(entry) = self.remove(id) {
            entry.shared.begin_closing(CloseReason::Unsubscribed);
        }
    }

    /// Drop the pool entry, which closes the subscriber's outbox.
    pub(crate) fn remove(&self, id: SubscriberId) -> Option<PoolEntry> {
        let mut pool = self.pool.write();
        let removed = pool.remove(&id);
        let pool_size = pool.len();
        drop(pool);

        if removed.is_some() {
            debug!(subscriber = %id, pool_size, "Subscriber left");
        }
        removed
    }

    /// Enqueue `message` on the outbox of every active subscriber.
    pub fn fan_out(&self, message: Message) -> SubmitReport {
        let message_type = message.message_type();
        let message = Arc::new(message);
        let mut report = SubmitReport::default();
        let mut overflowed = Vec::new();
        let mut stale = Vec::new();

        let pool = self.pool.upgradable_read();
        for (id, entry) in pool.iter() {
            if !entry.shared.is_active() {
                continue;
            }
            match entry.outbox.try_send(Arc::clone(&message)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => match self.overflow_policy {
                    OverflowPolicy::DropNewest => {
                        report.dropped += 1;
                        warn!(
                            subscriber = %id,
                            message_type = %message_type,
                            "Outbox full, message dropped for subscriber"
                        );
                    }
                    OverflowPolicy::Disconnect => {
                        report.disconnected += 1;
                        overflowed.push(*id);
                    }
                },
                Err(TrySendError::Closed(_)) => stale.push(*id),
            }
        }

        if overflowed.is_empty() && stale.is_empty() {
            drop(pool);
        } else {
            let mut pool = RwLockUpgradableReadGuard::upgrade(pool);
            let evicted: Vec<(PoolEntry, CloseReason)> = overflowed
                .iter()
                .map(|id| (id, CloseReason::Overflow))
                .chain(stale.iter().map(|id| (id, CloseReason::Released)))
                .filter_map(|(id, reason)| pool.remove(id).map(|entry| (entry, reason)))
                .collect();
            let pool_size = pool.len();
            drop(pool);

            for (entry, reason) in evicted {
                if entry.shared.begin_closing(reason) && reason == CloseReason::Overflow {
                    warn!(
                        subscriber = %entry.shared.id(),
                        message_type = %message_type,
                        pool_size,
                        "Outbox full, slow subscriber disconnected"
                    );
                }
            }
        }

        self.metrics.message_submitted();
        self.metrics.messages_enqueued(report.delivered as u64);
        self.metrics.messages_dropped(report.dropped as u64);
        self.metrics.overflow_disconnects(report.disconnected as u64);
        trace!(
            message_type = %message_type,
            delivered = report.delivered,
            dropped = report.dropped,
            disconnected = report.disconnected,
            "Message submitted"
        );
        report
    }

    /// Number of subscribers currently in the pool.
    pub fn pool_size(&self) -> usize {
        self.pool.read().len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Force every active subscriber into `Closing` and refuse new ones.
    ///
    /// Returns the number of subscribers that were removed. Calling it again
    /// is harmless.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<PoolEntry> = {
            let mut pool = self.pool.write();
            self.shut_down.store(true, Ordering::Release);
            pool.drain().map(|(_, entry)| entry).collect()
        };

        // Reasons are recorded before the senders drop, so adapters that
        // observe the end of their outbox already see `Shutdown`.
        for entry in &drained {
            entry.shared.begin_closing(CloseReason::Shutdown);
        }
        if !drained.is_empty() {
            info!(subscribers = drained.len(), "Hub shutdown, closing all subscribers");
        }
        drained.len()
    }

    pub fn metrics(&self) -> HubMetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl EventSink for Hub {
    fn submit(&self, message: Message) {
        self.fan_out(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::SubscriberState;
    use kubecast_core::{EventKind, ResourceKind};
    use serde_json::json;
    use std::time::Duration;

    fn hub_with(capacity: usize, policy: OverflowPolicy) -> Arc<Hub> {
        Hub::new(&HubConfig {
            outbox_capacity: capacity,
            overflow_policy: policy,
        })
    }

    fn message(resource: ResourceKind, event: EventKind) -> Message {
        Message::new(resource, event, json!({"kind": resource.as_str()})).unwrap()
    }

    fn drain_tags(subscription: &mut Subscription) -> Vec<String> {
        std::iter::from_fn(|| subscription.try_next())
            .map(|m| m.message_type().to_string())
            .collect()
    }

    #[test]
    fn test_hub_registration() {
        let hub = Hub::new(&HubConfig::default());

        let a = hub.subscribe();
        let b = hub.subscribe();
        assert_eq!(hub.pool_size(), 2);
        assert_ne!(a.id(), b.id());

        hub.unsubscribe(a.id());
        assert_eq!(hub.pool_size(), 1);
        assert_eq!(a.state(), SubscriberState::Closing);
        assert_eq!(a.close_reason(), Some(CloseReason::Unsubscribed));

        // Second unsubscribe is a no-op
        hub.unsubscribe(a.id());
        assert_eq!(hub.pool_size(), 1);
        assert_eq!(hub.metrics().total_subscribers, 2);
    }

    #[test]
    fn test_fan_out_reaches_every_subscriber_once() {
        let hub = Hub::new(&HubConfig::default());
        let mut subscriptions: Vec<_> = (0..5).map(|_| hub.subscribe()).collect();

        let report = hub.fan_out(message(ResourceKind::Task, EventKind::Created));
        assert_eq!(
            report,
            SubmitReport {
                delivered: 5,
                dropped: 0,
                disconnected: 0
            }
        );

        for subscription in &mut subscriptions {
            assert_eq!(drain_tags(subscription), vec!["TaskCreated"]);
        }
    }

    #[test]
    fn test_fan_out_without_subscribers() {
        let hub = Hub::new(&HubConfig::default());
        let report = hub.fan_out(message(ResourceKind::Pipeline, EventKind::Created));
        assert_eq!(report, SubmitReport::default());
        assert_eq!(hub.metrics().messages_submitted, 1);
    }

    #[test]
    fn test_lifecycle_order_per_subscriber() {
        let hub = Hub::new(&HubConfig::default());
        let mut subscriptions: Vec<_> = (0..3).map(|_| hub.subscribe()).collect();

        for event in ResourceKind::Task.events() {
            hub.submit(message(ResourceKind::Task, *event));
        }
        for event in ResourceKind::Namespace.events() {
            hub.submit(message(ResourceKind::Namespace, *event));
        }

        for subscription in &mut subscriptions {
            assert_eq!(
                drain_tags(subscription),
                vec![
                    "TaskCreated",
                    "TaskUpdated",
                    "TaskDeleted",
                    "NamespaceCreated",
                    "NamespaceDeleted"
                ]
            );
        }
    }

    #[test]
    fn test_late_joiner_and_early_leaver() {
        let hub = Hub::new(&HubConfig::default());
        let mut steady = hub.subscribe();
        let mut leaver = hub.subscribe();

        hub.submit(message(ResourceKind::ClusterTask, EventKind::Created));
        let mut joiner = hub.subscribe();
        leaver.close(CloseReason::PeerClosed);
        hub.submit(message(ResourceKind::ClusterTask, EventKind::Updated));
        hub.submit(message(ResourceKind::ClusterTask, EventKind::Deleted));

        assert_eq!(
            drain_tags(&mut steady),
            vec!["ClusterTaskCreated", "ClusterTaskUpdated", "ClusterTaskDeleted"]
        );
        assert_eq!(
            drain_tags(&mut joiner),
            vec!["ClusterTaskUpdated", "ClusterTaskDeleted"]
        );
        assert_eq!(drain_tags(&mut leaver), vec!["ClusterTaskCreated"]);
    }

    #[test]
    fn test_drop_newest_policy() {
        let hub = hub_with(2, OverflowPolicy::DropNewest);
        let mut slow = hub.subscribe();
        let mut fast = hub.subscribe();

        hub.submit(message(ResourceKind::TaskRun, EventKind::Created));
        hub.submit(message(ResourceKind::TaskRun, EventKind::Updated));
        assert_eq!(fast.try_next().unwrap().message_type().to_string(), "TaskRunCreated");
        assert_eq!(fast.try_next().unwrap().message_type().to_string(), "TaskRunUpdated");

        let report = hub.fan_out(message(ResourceKind::TaskRun, EventKind::Deleted));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.disconnected, 0);

        // Slow subscriber stays registered and keeps what it had.
        assert_eq!(hub.pool_size(), 2);
        assert_eq!(slow.state(), SubscriberState::Active);
        assert_eq!(drain_tags(&mut slow), vec!["TaskRunCreated", "TaskRunUpdated"]);
        assert_eq!(drain_tags(&mut fast), vec!["TaskRunDeleted"]);
        assert_eq!(hub.metrics().messages_dropped, 1);
    }

    #[tokio::test]
    async fn test_disconnect_policy_evicts_slow_subscriber() {
        let hub = hub_with(1, OverflowPolicy::Disconnect);
        let mut slow = hub.subscribe();
        let mut fast = hub.subscribe();

        hub.submit(message(ResourceKind::Secret, EventKind::Created));
        assert!(fast.try_next().is_some());

        let report = hub.fan_out(message(ResourceKind::Secret, EventKind::Updated));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.disconnected, 1);
        assert_eq!(hub.pool_size(), 1);
        assert_eq!(slow.state(), SubscriberState::Closing);
        assert_eq!(slow.close_reason(), Some(CloseReason::Overflow));
        assert_eq!(drain_tags(&mut fast), vec!["SecretUpdated"]);

        // No gap: the evicted subscriber never sees anything after the overflow.
        hub.submit(message(ResourceKind::Secret, EventKind::Deleted));
        assert_eq!(
            slow.next().await.unwrap().message_type().to_string(),
            "SecretCreated"
        );
        assert!(slow.next().await.is_none());

        assert_eq!(drain_tags(&mut fast), vec!["SecretDeleted"]);
        assert_eq!(hub.pool_size(), 1);
        assert_eq!(hub.metrics().overflow_disconnects, 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_everyone() {
        let hub = Hub::new(&HubConfig::default());
        let mut a = hub.subscribe();
        let b = hub.subscribe();
        hub.submit(message(ResourceKind::Namespace, EventKind::Created));

        assert_eq!(hub.shutdown(), 2);
        assert_eq!(hub.pool_size(), 0);
        assert!(hub.is_shut_down());
        assert_eq!(b.close_reason(), Some(CloseReason::Shutdown));

        // Already queued messages can still be drained.
        assert!(a.next().await.is_some());
        assert!(a.next().await.is_none());

        // Racing client close after shutdown is harmless.
        assert!(!b.close(CloseReason::PeerClosed));
        assert_eq!(hub.shutdown(), 0);

        let mut late = hub.subscribe();
        assert_eq!(late.state(), SubscriberState::Closing);
        assert_eq!(late.close_reason(), Some(CloseReason::Shutdown));
        assert_eq!(hub.pool_size(), 0);
        assert!(late.next().await.is_none());
    }

    #[test]
    fn test_event_sink_through_arc() {
        let hub = Hub::new(&HubConfig::default());
        let mut subscription = hub.subscribe();
        let sink: Arc<dyn EventSink> = hub.clone();

        sink.publish(ResourceKind::ServiceExtension, EventKind::Created, json!({}))
            .unwrap();
        assert!(sink
            .publish(ResourceKind::Namespace, EventKind::Updated, json!({}))
            .is_err());
        assert_eq!(drain_tags(&mut subscription), vec!["ServiceExtensionCreated"]);
    }

    #[test]
    fn test_concurrent_churn_keeps_order() {
        const MESSAGES: u64 = 1_000;

        let hub = hub_with(2_048, OverflowPolicy::DropNewest);
        let mut steady: Vec<_> = (0..4).map(|_| hub.subscribe()).collect();

        let producer = {
            let hub = Arc::clone(&hub);
            std::thread::spawn(move || {
                for seq in 0..MESSAGES {
                    let msg = Message::new(ResourceKind::TaskRun, EventKind::Updated, json!(seq))
                        .unwrap();
                    let report = hub.fan_out(msg);
                    assert_eq!(report.dropped, 0);
                }
            })
        };

        let churners: Vec<_> = (0..4)
            .map(|_| {
                let hub = Arc::clone(&hub);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let mut subscription = hub.subscribe();
                        std::thread::sleep(Duration::from_micros(50));
                        subscription.close(CloseReason::PeerClosed);
                        let seen: Vec<u64> = std::iter::from_fn(|| subscription.try_next())
                            .map(|m| m.payload().as_u64().unwrap())
                            .collect();
                        // Contiguous run: no skips and no duplicates.
                        assert!(seen.windows(2).all(|w| w[1] == w[0] + 1));
                    }
                })
            })
            .collect();

        producer.join().unwrap();
        for churner in churners {
            churner.join().unwrap();
        }

        for subscription in &mut steady {
            let seen: Vec<u64> = std::iter::from_fn(|| subscription.try_next())
                .map(|m| m.payload().as_u64().unwrap())
                .collect();
            assert_eq!(seen, (0..MESSAGES).collect::<Vec<_>>());
        }
        assert_eq!(hub.pool_size(), steady.len());
    }
}
