//! Push notification channel abstraction
//!
//! The transfer service publishes completion events to a topic. The exporter
//! reads them through a subscription and acknowledges each one.

pub mod memory;

use crate::domain::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;

pub use memory::MemoryNotificationChannel;

/// One received notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Delivery id used to ack or nack
    pub id: String,
    pub attributes: HashMap<String, String>,
}

impl Notification {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Whether a subscription was created or already existed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Created,
    Found,
}

/// Fully qualified subscription path for a topic
pub fn subscription_path(project_id: &str, topic: &str) -> String {
    format!("projects/{project_id}/subscriptions/{topic}")
}

/// Fully qualified topic path
pub fn topic_path(project_id: &str, topic: &str) -> String {
    format!("projects/{project_id}/topics/{topic}")
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Creates the subscription unless it already exists
    async fn ensure_subscription(&self, subscription: &str, topic: &str)
        -> Result<SubscriptionStatus>;

    /// Stream of notifications; ends when the underlying connection closes
    async fn subscribe(&self, subscription: &str) -> Result<BoxStream<'static, Notification>>;

    async fn ack(&self, notification: &Notification) -> Result<()>;

    /// Returns the notification for redelivery
    async fn nack(&self, notification: &Notification) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(
            subscription_path("gcp-proj", "transfers"),
            "projects/gcp-proj/subscriptions/transfers"
        );
        assert_eq!(
            topic_path("gcp-proj", "transfers"),
            "projects/gcp-proj/topics/transfers"
        );
    }
}
