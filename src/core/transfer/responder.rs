//! Push path for transfer completion
//!
//! The transfer service publishes an event to a topic when a job's operation
//! succeeds. Several environments may share the topic, so events for export
//! jobs unknown to this environment's metadata store are returned for
//! redelivery instead of being consumed.

use crate::adapters::notification::{
    subscription_path, topic_path, Notification, NotificationChannel, SubscriptionStatus,
};
use crate::core::state::ExportJobTracker;
use crate::domain::{ExportJobId, Result, TaskState, TransferJobName};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub const EVENT_TYPE_ATTRIBUTE: &str = "eventType";
pub const JOB_NAME_ATTRIBUTE: &str = "transferJobName";
pub const TRANSFER_SUCCESS_EVENT: &str = "TRANSFER_OPERATION_SUCCESS";

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

/// What the responder did with one notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderDecision {
    /// The job's data file transfer was marked COMPLETE; acked
    Completed(ExportJobId),
    /// The job was already COMPLETE; acked without side effects
    AlreadyComplete(ExportJobId),
    /// Not a notification for this environment; nacked
    Rejected(String),
}

pub struct TransferResponder {
    channel: Arc<dyn NotificationChannel>,
    tracker: Arc<ExportJobTracker>,
    subscription: String,
    topic: String,
}

impl TransferResponder {
    pub fn new(
        channel: Arc<dyn NotificationChannel>,
        tracker: Arc<ExportJobTracker>,
        project_id: &str,
        topic: &str,
    ) -> Self {
        Self {
            channel,
            tracker,
            subscription: subscription_path(project_id, topic),
            topic: topic_path(project_id, topic),
        }
    }

    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    /// Creates the subscription if missing; failures are logged, not returned
    pub async fn ensure_subscription(&self) {
        match self
            .channel
            .ensure_subscription(&self.subscription, &self.topic)
            .await
        {
            Ok(SubscriptionStatus::Created) => {
                tracing::info!(subscription = %self.subscription, "Subscription created")
            }
            Ok(SubscriptionStatus::Found) => {
                tracing::info!(subscription = %self.subscription, "Subscription found")
            }
            Err(e) => tracing::warn!(
                subscription = %self.subscription,
                error = %e,
                "Cannot check whether subscription exists"
            ),
        }
    }

    /// Handles one notification and acks or nacks it
    ///
    /// # Errors
    ///
    /// A metadata store failure nacks the notification and is returned.
    pub async fn handle(&self, notification: &Notification) -> Result<ResponderDecision> {
        let decision = match self.decide(notification).await {
            Ok(decision) => decision,
            Err(e) => {
                self.channel.nack(notification).await?;
                return Err(e);
            }
        };

        match &decision {
            ResponderDecision::Completed(id) => {
                tracing::info!(export_job_id = %id, "Data file transfer complete");
                self.channel.ack(notification).await?;
            }
            ResponderDecision::AlreadyComplete(id) => {
                tracing::debug!(export_job_id = %id, "Data file transfer already marked complete");
                self.channel.ack(notification).await?;
            }
            ResponderDecision::Rejected(reason) => {
                tracing::warn!(
                    notification_id = %notification.id,
                    attributes = ?notification.attributes,
                    reason = %reason,
                    "Rejected transfer notification"
                );
                self.channel.nack(notification).await?;
            }
        }
        Ok(decision)
    }

    async fn decide(&self, notification: &Notification) -> Result<ResponderDecision> {
        let event_type = notification.attribute(EVENT_TYPE_ATTRIBUTE).unwrap_or_default();
        if event_type != TRANSFER_SUCCESS_EVENT {
            return Ok(ResponderDecision::Rejected(format!(
                "unexpected event type '{event_type}'"
            )));
        }

        let raw_name = notification.attribute(JOB_NAME_ATTRIBUTE).unwrap_or_default();
        let Some(job_name) = TransferJobName::parse(raw_name) else {
            return Ok(ResponderDecision::Rejected(format!(
                "unparseable transfer job name '{raw_name}'"
            )));
        };
        let export_job_id = job_name.export_job_id();

        let Some(job) = self.tracker.get_job(&export_job_id).await? else {
            return Ok(ResponderDecision::Rejected(format!(
                "export job {export_job_id} does not exist in this environment"
            )));
        };
        if job.data_file_transfer == TaskState::Complete {
            return Ok(ResponderDecision::AlreadyComplete(export_job_id));
        }

        self.tracker.mark_transfer_complete(&export_job_id).await?;
        Ok(ResponderDecision::Completed(export_job_id))
    }

    /// Consumes notifications until shutdown, re-subscribing whenever the
    /// stream ends
    ///
    /// Every re-subscribe waits `RESUBSCRIBE_DELAY` first.
    pub async fn listen(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.ensure_subscription().await;

        while !*shutdown.borrow() {
            let mut stream = match self.channel.subscribe(&self.subscription).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!(subscription = %self.subscription, error = %e, "Subscribe failed");
                    if !pause(&mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };
            tracing::info!(subscription = %self.subscription, "Transfer notification listener running");

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::info!("Transfer notification listener stopping");
                            return Ok(());
                        }
                    }
                    next = stream.next() => match next {
                        Some(notification) => {
                            if let Err(e) = self.handle(&notification).await {
                                tracing::error!(
                                    notification_id = %notification.id,
                                    error = %e,
                                    "Failed to handle transfer notification"
                                );
                            }
                        }
                        None => {
                            tracing::warn!(
                                subscription = %self.subscription,
                                "Notification stream ended, re-subscribing"
                            );
                            break;
                        }
                    }
                }
            }

            if !pause(&mut shutdown).await {
                break;
            }
        }

        tracing::info!("Transfer notification listener stopping");
        Ok(())
    }
}

/// Sleeps `RESUBSCRIBE_DELAY`; false when shutdown arrives first
async fn pause(shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => true,
        changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
    }
}
