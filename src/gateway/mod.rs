//! Message gateway
//!
//! Each consumed queue gets its own pool of `workers` consumers. A consumer
//! holds at most `prefetch` unacknowledged deliveries and handles them one
//! at a time, so a message that blocks on a long poll only occupies one slot
//! of its own queue's pool. Per delivery:
//!
//! 1. decode, build the correlation span and run the staleness guard
//! 2. run the unit of work
//! 3. ack, then publish the continuation (if the queue has one) with the
//!    publish [`RetryPolicy`]
//!
//! Any error rejects the delivery without requeue, which dead-letters it.

pub mod context;
pub mod handler;
pub mod retry;

pub use context::CorrelationContext;
pub use handler::{Dispatch, Guard, HandlerOutcome, MessageHandler};
pub use retry::RetryPolicy;

use crate::adapters::broker::{Delivery, MessageBroker, QueueBinding};
use crate::config::{BrokerConfig, QueueConfig};
use crate::domain::Result;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// A consumed queue and the handler its messages go to
#[derive(Clone)]
pub struct QueueRoute {
    pub binding: QueueBinding,
    pub continuation_routing_key: Option<String>,
    pub workers: usize,
    pub handler: Arc<dyn Dispatch>,
}

impl QueueRoute {
    pub fn from_config(broker: &BrokerConfig, queue: &QueueConfig, handler: Arc<dyn Dispatch>) -> Self {
        Self {
            binding: QueueBinding::from_config(broker, queue),
            continuation_routing_key: queue.continuation_routing_key.clone(),
            workers: queue.workers.max(1),
            handler,
        }
    }
}

/// What happened to one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Handled and acked; `continued` is whether a continuation went out
    Acked { continued: bool },
    /// Acked without running the work
    Skipped(String),
    /// Rejected without requeue
    Rejected(String),
}

pub struct MessageGateway {
    broker: Arc<dyn MessageBroker>,
    exchange: String,
    prefetch: u16,
    publish_retry: RetryPolicy,
    routes: Vec<QueueRoute>,
}

impl MessageGateway {
    pub fn new(broker: Arc<dyn MessageBroker>, config: &BrokerConfig) -> Self {
        Self {
            broker,
            exchange: config.exchange.clone(),
            prefetch: config.prefetch_count.max(1),
            publish_retry: config.publish_retry.policy(),
            routes: Vec::new(),
        }
    }

    pub fn with_publish_retry(mut self, policy: RetryPolicy) -> Self {
        self.publish_retry = policy;
        self
    }

    pub fn route(mut self, route: QueueRoute) -> Self {
        self.routes.push(route);
        self
    }

    pub fn routes(&self) -> &[QueueRoute] {
        &self.routes
    }

    /// Declares every queue, then consumes until shutdown
    ///
    /// A consumer finishes the delivery it is handling before it stops.
    ///
    /// # Errors
    ///
    /// Returns the first declare or consume failure.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Result<()> {
        for route in &self.routes {
            self.broker.declare(&route.binding).await?;
            tracing::info!(
                queue = %route.binding.queue,
                routing_key = %route.binding.routing_key,
                workers = route.workers,
                handler = route.handler.name(),
                "Queue declared"
            );
        }

        let mut consumers = JoinSet::new();
        for (index, route) in self.routes.iter().enumerate() {
            for worker in 0..route.workers {
                let gateway = Arc::clone(&self);
                let shutdown = shutdown.clone();
                consumers.spawn(async move { gateway.consume(index, worker, shutdown).await });
            }
        }

        let mut result = Ok(());
        while let Some(joined) = consumers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Consumer failed");
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
                Err(e) => tracing::error!(error = %e, "Consumer task panicked"),
            }
        }
        tracing::info!("Message gateway stopped");
        result
    }

    async fn consume(&self, route_index: usize, worker: usize, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let Some(route) = self.routes.get(route_index) else {
            return Ok(());
        };
        let queue = route.binding.queue.as_str();
        let mut deliveries = self.broker.consume(queue, self.prefetch).await?;
        tracing::debug!(queue, worker, "Consumer started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                next = deliveries.next() => match next {
                    Some(delivery) => {
                        self.process(route, &delivery).await?;
                    }
                    None => {
                        tracing::warn!(queue, worker, "Delivery stream ended");
                        break;
                    }
                }
            }
        }

        tracing::debug!(queue, worker, "Consumer stopped");
        Ok(())
    }

    /// Handles one delivery and settles it with the broker
    ///
    /// # Errors
    ///
    /// Only a failed ack or reject is returned; handler errors reject the
    /// delivery and come back as [`Disposition::Rejected`].
    pub async fn process(&self, route: &QueueRoute, delivery: &Delivery) -> Result<Disposition> {
        match route.handler.dispatch(&delivery.body).await {
            Ok(HandlerOutcome::Skipped(reason)) => {
                self.broker.ack(delivery).await?;
                Ok(Disposition::Skipped(reason))
            }
            Ok(HandlerOutcome::Completed) => {
                self.broker.ack(delivery).await?;
                let continued = match &route.continuation_routing_key {
                    Some(routing_key) => self.publish_continuation(routing_key, delivery).await,
                    None => false,
                };
                Ok(Disposition::Acked { continued })
            }
            Err(e) => {
                tracing::error!(
                    queue = %delivery.queue,
                    delivery_tag = delivery.tag,
                    handler = route.handler.name(),
                    error = %e,
                    "Rejecting message"
                );
                self.broker.reject(delivery, false).await?;
                Ok(Disposition::Rejected(e.to_string()))
            }
        }
    }

    /// Republishes the handled body under the continuation routing key
    async fn publish_continuation(&self, routing_key: &str, delivery: &Delivery) -> bool {
        let result = self
            .publish_retry
            .retry("continuation publish", || {
                self.broker
                    .publish(&self.exchange, routing_key, delivery.body.clone())
            })
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(routing_key, "Continuation published");
                true
            }
            Err(e) => {
                tracing::error!(
                    routing_key,
                    delivery_tag = delivery.tag,
                    error = %e,
                    "Continuation publish failed; message already acked"
                );
                false
            }
        }
    }
}
