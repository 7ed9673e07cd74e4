//! In-memory broker with topic routing, prefetch and dead-lettering

use super::{Delivery, MessageBroker, QueueBinding};
use crate::domain::{ExporterError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// A message published to an exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub exchange: String,
    pub routing_key: String,
    pub body: Bytes,
}

#[derive(Debug, Default)]
struct Queue {
    binding: Option<QueueBinding>,
    ready: VecDeque<Delivery>,
    unacked: usize,
}

#[derive(Debug, Default)]
struct State {
    queues: HashMap<String, Queue>,
    /// Delivery tag to the consumer holding it
    in_flight: HashMap<u64, u64>,
    /// Unsettled deliveries per consumer
    consumer_unacked: HashMap<u64, usize>,
    published: Vec<Published>,
    acked: Vec<Delivery>,
    rejected: Vec<(Delivery, bool)>,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<State>,
    notify: Notify,
    next_tag: AtomicU64,
    next_consumer: AtomicU64,
    failing_publishes: AtomicUsize,
    closed: AtomicBool,
}

impl Inner {
    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| ExporterError::Broker("broker state lock poisoned".to_string()))
    }

    /// Queues `body` on every queue bound to `exchange` with `routing_key`
    fn route(&self, state: &mut State, exchange: &str, routing_key: &str, body: Bytes) {
        for queue in state.queues.values_mut() {
            let Some(binding) = queue.binding.as_ref() else {
                continue;
            };
            if binding.exchange != exchange || binding.routing_key != routing_key {
                continue;
            }
            let delivery = Delivery {
                tag: self.next_tag.fetch_add(1, Ordering::SeqCst) + 1,
                queue: binding.queue.clone(),
                routing_key: routing_key.to_string(),
                body: body.clone(),
            };
            queue.ready.push_back(delivery);
        }
        self.notify.notify_waiters();
    }

    fn try_take(&self, queue: &str, consumer: u64, prefetch: usize) -> Result<Option<Delivery>> {
        let mut state = self.lock()?;
        if state.consumer_unacked.get(&consumer).copied().unwrap_or_default() >= prefetch {
            return Ok(None);
        }
        let Some(queue) = state.queues.get_mut(queue) else {
            return Ok(None);
        };
        let Some(delivery) = queue.ready.pop_front() else {
            return Ok(None);
        };
        queue.unacked += 1;
        state.in_flight.insert(delivery.tag, consumer);
        *state.consumer_unacked.entry(consumer).or_default() += 1;
        Ok(Some(delivery))
    }

    fn settle(&self, state: &mut State, delivery: &Delivery) {
        if let Some(queue) = state.queues.get_mut(&delivery.queue) {
            queue.unacked = queue.unacked.saturating_sub(1);
        }
        if let Some(consumer) = state.in_flight.remove(&delivery.tag) {
            if let Some(count) = state.consumer_unacked.get_mut(&consumer) {
                *count = count.saturating_sub(1);
            }
        }
        self.notify.notify_waiters();
    }
}

/// [`MessageBroker`] held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes straight into the exchange, bypassing failure injection
    pub fn send(&self, exchange: &str, routing_key: &str, body: impl Into<Bytes>) {
        if let Ok(mut state) = self.inner.lock() {
            self.inner
                .route(&mut state, exchange, routing_key, body.into());
        }
    }

    /// Makes the next `count` publishes fail
    pub fn fail_next_publishes(&self, count: usize) {
        self.inner.failing_publishes.store(count, Ordering::SeqCst);
    }

    /// Ends every consumer stream
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn published(&self) -> Vec<Published> {
        self.inner
            .lock()
            .map(|state| state.published.clone())
            .unwrap_or_default()
    }

    pub fn acked(&self) -> Vec<Delivery> {
        self.inner
            .lock()
            .map(|state| state.acked.clone())
            .unwrap_or_default()
    }

    /// Rejected deliveries with their requeue flag
    pub fn rejected(&self) -> Vec<(Delivery, bool)> {
        self.inner
            .lock()
            .map(|state| state.rejected.clone())
            .unwrap_or_default()
    }

    /// Messages waiting in `queue`
    pub fn ready(&self, queue: &str) -> Vec<Delivery> {
        self.inner
            .lock()
            .ok()
            .and_then(|state| {
                state
                    .queues
                    .get(queue)
                    .map(|q| q.ready.iter().cloned().collect())
            })
            .unwrap_or_default()
    }

    /// Number of deliveries handed out and not yet settled
    pub fn unacked(&self, queue: &str) -> usize {
        self.inner
            .lock()
            .ok()
            .and_then(|state| state.queues.get(queue).map(|q| q.unacked))
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageBroker for MemoryBroker {
    async fn declare(&self, binding: &QueueBinding) -> Result<()> {
        let mut state = self.inner.lock()?;
        state.queues.entry(binding.queue.clone()).or_default().binding = Some(binding.clone());
        if let (Some(exchange), Some(routing_key)) = (
            binding.dead_letter_exchange.as_ref(),
            binding.dead_letter_routing_key.as_ref(),
        ) {
            let dead_letter = QueueBinding {
                queue: format!("{}.dead-letter", binding.queue),
                exchange: exchange.clone(),
                routing_key: routing_key.clone(),
                dead_letter_exchange: None,
                dead_letter_routing_key: None,
            };
            let dead_letter_queue = dead_letter.queue.clone();
            state
                .queues
                .entry(dead_letter_queue)
                .or_default()
                .binding = Some(dead_letter);
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, prefetch: u16) -> Result<BoxStream<'static, Delivery>> {
        if !self.inner.lock()?.queues.contains_key(queue) {
            return Err(ExporterError::Broker(format!("queue {queue} is not declared")));
        }

        let inner = self.inner.clone();
        let queue = queue.to_string();
        let prefetch = usize::from(prefetch.max(1));
        let consumer = inner.next_consumer.fetch_add(1, Ordering::SeqCst);

        Ok(stream::unfold((inner, queue), move |(inner, queue)| async move {
            loop {
                let taken = {
                    let notified = inner.notify.notified();
                    if inner.closed.load(Ordering::SeqCst) {
                        return None;
                    }
                    match inner.try_take(&queue, consumer, prefetch) {
                        Ok(Some(delivery)) => Some(delivery),
                        Ok(None) => {
                            notified.await;
                            None
                        }
                        Err(_) => return None,
                    }
                };
                if let Some(delivery) = taken {
                    return Some((delivery, (inner, queue)));
                }
            }
        })
        .boxed())
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut state = self.inner.lock()?;
        state.acked.push(delivery.clone());
        self.inner.settle(&mut state, delivery);
        Ok(())
    }

    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<()> {
        let mut state = self.inner.lock()?;
        state.rejected.push((delivery.clone(), requeue));

        let dead_letter = state
            .queues
            .get(&delivery.queue)
            .and_then(|queue| queue.binding.as_ref())
            .and_then(|binding| {
                binding
                    .dead_letter_exchange
                    .clone()
                    .zip(binding.dead_letter_routing_key.clone())
            });

        if requeue {
            if let Some(queue) = state.queues.get_mut(&delivery.queue) {
                queue.ready.push_front(delivery.clone());
            }
        } else if let Some((exchange, routing_key)) = dead_letter {
            self.inner
                .route(&mut state, &exchange, &routing_key, delivery.body.clone());
        }
        self.inner.settle(&mut state, delivery);
        Ok(())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, body: Bytes) -> Result<()> {
        let failing = self
            .inner
            .failing_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(ExporterError::Broker(format!(
                "publish to {exchange}/{routing_key} refused"
            )));
        }

        let mut state = self.inner.lock()?;
        state.published.push(Published {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body: body.clone(),
        });
        self.inner.route(&mut state, exchange, routing_key, body);
        Ok(())
    }
}
