//! In-memory notification channel

use super::{Notification, NotificationChannel, SubscriptionStatus};
use crate::domain::{ExporterError, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// [`NotificationChannel`] fed by [`MemoryNotificationChannel::publish`]
///
/// Only one subscriber can hold the stream at a time; a stream ends when
/// [`MemoryNotificationChannel::disconnect`] is called, after which the next
/// `subscribe` starts a fresh stream.
#[derive(Debug)]
pub struct MemoryNotificationChannel {
    sender: Mutex<mpsc::UnboundedSender<Notification>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Notification>>>,
    subscriptions: Mutex<HashSet<String>>,
    acked: Mutex<Vec<String>>,
    nacked: Mutex<Vec<String>>,
    subscribe_calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl Default for MemoryNotificationChannel {
    fn default() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(sender),
            receiver: Mutex::new(Some(receiver)),
            subscriptions: Mutex::new(HashSet::new()),
            acked: Mutex::new(Vec::new()),
            nacked: Mutex::new(Vec::new()),
            subscribe_calls: AtomicUsize::new(0),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl MemoryNotificationChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a notification with the given attributes, returning its id
    pub fn publish(&self, attributes: &[(&str, &str)]) -> String {
        let id = format!("msg-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let notification = Notification {
            id: id.clone(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        };
        if let Ok(sender) = self.sender.lock() {
            let _ = sender.send(notification);
        }
        id
    }

    /// Ends the current stream; queued notifications are still delivered first
    pub fn disconnect(&self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        if let Ok(mut current) = self.sender.lock() {
            *current = sender;
        }
        if let Ok(mut pending) = self.receiver.lock() {
            // A receiver not yet taken keeps its queue; swap in the new one after draining.
            if let Some(mut old) = pending.replace(receiver) {
                while let Ok(notification) = old.try_recv() {
                    self.publish_notification(notification);
                }
            }
        }
    }

    fn publish_notification(&self, notification: Notification) {
        if let Ok(sender) = self.sender.lock() {
            let _ = sender.send(notification);
        }
    }

    pub fn acked(&self) -> Vec<String> {
        self.acked.lock().map(|ids| ids.clone()).unwrap_or_default()
    }

    pub fn nacked(&self) -> Vec<String> {
        self.nacked.lock().map(|ids| ids.clone()).unwrap_or_default()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationChannel for MemoryNotificationChannel {
    async fn ensure_subscription(
        &self,
        subscription: &str,
        _topic: &str,
    ) -> Result<SubscriptionStatus> {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .map_err(|_| ExporterError::Notification("subscription lock poisoned".to_string()))?;
        if subscriptions.insert(subscription.to_string()) {
            Ok(SubscriptionStatus::Created)
        } else {
            Ok(SubscriptionStatus::Found)
        }
    }

    async fn subscribe(&self, subscription: &str) -> Result<BoxStream<'static, Notification>> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let receiver = self
            .receiver
            .lock()
            .map_err(|_| ExporterError::Notification("receiver lock poisoned".to_string()))?
            .take()
            .ok_or_else(|| {
                ExporterError::Notification(format!("{subscription} already has a subscriber"))
            })?;

        Ok(stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|n| (n, receiver))
        })
        .boxed())
    }

    async fn ack(&self, notification: &Notification) -> Result<()> {
        if let Ok(mut acked) = self.acked.lock() {
            acked.push(notification.id.clone());
        }
        Ok(())
    }

    async fn nack(&self, notification: &Notification) -> Result<()> {
        if let Ok(mut nacked) = self.nacked.lock() {
            nacked.push(notification.id.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_yields_published() {
        let channel = MemoryNotificationChannel::new();
        let id = channel.publish(&[("eventType", "TRANSFER_OPERATION_SUCCESS")]);

        let mut stream = channel.subscribe("sub").await.unwrap();
        let received = stream.next().await.unwrap();

        assert_eq!(received.id, id);
        assert_eq!(
            received.attribute("eventType"),
            Some("TRANSFER_OPERATION_SUCCESS")
        );
    }

    #[tokio::test]
    async fn test_disconnect_ends_stream() {
        let channel = MemoryNotificationChannel::new();
        let mut stream = channel.subscribe("sub").await.unwrap();

        channel.disconnect();
        assert!(stream.next().await.is_none());

        channel.publish(&[("eventType", "X")]);
        let mut again = channel.subscribe("sub").await.unwrap();
        assert!(again.next().await.is_some());
    }

    #[tokio::test]
    async fn test_ensure_subscription_is_idempotent() {
        let channel = MemoryNotificationChannel::new();
        assert_eq!(
            channel.ensure_subscription("s", "t").await.unwrap(),
            SubscriptionStatus::Created
        );
        assert_eq!(
            channel.ensure_subscription("s", "t").await.unwrap(),
            SubscriptionStatus::Found
        );
    }
}
