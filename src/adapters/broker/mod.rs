//! Message broker abstraction
//!
//! Queues bind to a topic exchange by routing key. A queue may name a
//! dead-letter exchange and routing key; messages rejected without requeue
//! are routed there.

pub mod memory;

use crate::config::{QueueConfig, BrokerConfig};
use crate::domain::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

pub use memory::MemoryBroker;

/// Declaration of one consumed queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub dead_letter_exchange: Option<String>,
    pub dead_letter_routing_key: Option<String>,
}

impl QueueBinding {
    pub fn from_config(broker: &BrokerConfig, queue: &QueueConfig) -> Self {
        Self {
            queue: queue.queue.clone(),
            exchange: broker.exchange.clone(),
            routing_key: queue.routing_key.clone(),
            dead_letter_exchange: queue.dead_letter_exchange.clone(),
            dead_letter_routing_key: queue.dead_letter_routing_key.clone(),
        }
    }
}

/// A message handed to a consumer, pending ack or reject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: u64,
    pub queue: String,
    pub routing_key: String,
    pub body: Bytes,
}

#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Declares the queue and binds it to its exchange
    async fn declare(&self, binding: &QueueBinding) -> Result<()>;

    /// Deliveries of `queue`, at most `prefetch` unacknowledged at a time
    async fn consume(&self, queue: &str, prefetch: u16) -> Result<BoxStream<'static, Delivery>>;

    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Rejects the delivery; without requeue it goes to the dead-letter exchange
    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<()>;

    async fn publish(&self, exchange: &str, routing_key: &str, body: Bytes) -> Result<()>;
}
