//! Best-effort fan-out of alert notifications
//!
//! Publishing never blocks and never fails the caller. Each subscriber owns a
//! bounded channel; a full subscriber misses the event, a closed one is
//! pruned. Other subscribers are unaffected either way.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::alerts::AlertNotification;
use crate::observability::MonitorMetrics;

/// Default per-subscriber channel capacity
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

pub type SubscriberId = u64;

/// Sink for alert notifications
pub trait Notifier: Send + Sync {
    fn publish(&self, notification: AlertNotification);
}

/// Receiving end handed to a subscriber
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<AlertNotification>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next notification, or `None` once unsubscribed
    pub async fn recv(&mut self) -> Option<AlertNotification> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<AlertNotification> {
        self.receiver.try_recv().ok()
    }
}

/// Counts from one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub dropped: usize,
    pub pruned: usize,
}

/// In-process registry of live subscribers
#[derive(Debug)]
pub struct SubscriberHub {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<AlertNotification>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Default for SubscriberHub {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

impl SubscriberHub {
    /// `buffer` is clamped to at least one slot
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<AlertNotification>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);

        let count = {
            let mut subscribers = self.registry();
            subscribers.insert(id, tx);
            subscribers.len()
        };
        MonitorMetrics::new().set_subscribers(count);
        debug!(subscriber_id = id, subscribers = count, "Subscriber added");

        Subscription { id, receiver: rx }
    }

    /// Returns false if the subscriber was not registered
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let (removed, count) = {
            let mut subscribers = self.registry();
            let removed = subscribers.remove(&id).is_some();
            (removed, subscribers.len())
        };
        MonitorMetrics::new().set_subscribers(count);
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().len()
    }

    /// Offer the notification to every subscriber without waiting
    pub fn broadcast(&self, notification: &AlertNotification) -> DeliveryReport {
        let metrics = MonitorMetrics::new();
        let mut report = DeliveryReport::default();

        let mut subscribers = self.registry();
        let mut closed = Vec::new();

        for (id, tx) in subscribers.iter() {
            match tx.try_send(notification.clone()) {
                Ok(()) => {
                    report.delivered += 1;
                    metrics.inc_notification_delivered();
                }
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    metrics.inc_notification_dropped("full");
                    warn!(
                        subscriber_id = id,
                        alert_id = notification.id,
                        "Subscriber buffer full, notification dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    report.dropped += 1;
                    metrics.inc_notification_dropped("closed");
                    closed.push(*id);
                }
            }
        }

        for id in &closed {
            subscribers.remove(id);
            debug!(subscriber_id = id, "Pruned closed subscriber");
        }
        report.pruned = closed.len();
        metrics.set_subscribers(subscribers.len());

        report
    }
}

impl Notifier for SubscriberHub {
    fn publish(&self, notification: AlertNotification) {
        let report = self.broadcast(&notification);
        debug!(
            alert_id = notification.id,
            delivered = report.delivered,
            dropped = report.dropped,
            "Alert notification published"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertSeverity, AlertType};
    use chrono::Utc;

    fn notification(id: i64) -> AlertNotification {
        AlertNotification {
            id,
            device_code: "INV-001".to_string(),
            alert_type: AlertType::NegativeDelta,
            severity: AlertSeverity::Critical,
            message: "Device INV-001: negative delta detected".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let hub = SubscriberHub::default();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        let report = hub.broadcast(&notification(1));
        assert_eq!(report.delivered, 2);

        assert_eq!(first.recv().await.unwrap().id, 1);
        assert_eq!(second.recv().await.unwrap().id, 1);
    }

    #[tokio::test]
    async fn test_full_subscriber_does_not_affect_others() {
        let hub = SubscriberHub::new(1);
        let mut slow = hub.subscribe();
        let mut fast = hub.subscribe();

        hub.publish(notification(1));
        assert_eq!(fast.recv().await.unwrap().id, 1);

        let report = hub.broadcast(&notification(2));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.pruned, 0);

        assert_eq!(fast.recv().await.unwrap().id, 2);
        assert_eq!(slow.recv().await.unwrap().id, 1);
        assert!(slow.try_recv().is_none());
        assert_eq!(hub.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_pruned() {
        let hub = SubscriberHub::default();
        let gone = hub.subscribe();
        let mut live = hub.subscribe();
        drop(gone);

        let report = hub.broadcast(&notification(7));
        assert_eq!(report.pruned, 1);
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(live.recv().await.unwrap().id, 7);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let hub = SubscriberHub::default();
        let mut sub = hub.subscribe();
        assert!(hub.unsubscribe(sub.id()));
        assert!(!hub.unsubscribe(sub.id()));
        assert_eq!(hub.subscriber_count(), 0);

        hub.publish(notification(3));
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn test_recv_waits_for_publish() {
        let hub = SubscriberHub::default();
        let mut sub = hub.subscribe();

        let mut recv = tokio_test::task::spawn(sub.recv());
        tokio_test::assert_pending!(recv.poll());

        hub.publish(notification(9));
        assert!(recv.is_woken());
        let received = tokio_test::assert_ready!(recv.poll());
        assert_eq!(received.unwrap().id, 9);
    }
}
