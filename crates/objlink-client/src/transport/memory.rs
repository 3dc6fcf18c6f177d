//! In-process broker.
//!
//! Topic -> subscriber list, each subscriber owning a bounded queue. Publishing
//! never blocks: a full queue drops the message and the subscriber is told how
//! many it missed (`SlowConsumer`) once there is room again. Requests attach a
//! reply channel to the published message and wait for the first answer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use objlink_core::error::{ObjLinkError, Result};

use crate::config::schema::MEMORY_SCHEME;
use crate::config::BrokerSection;

use super::{
    Connector, Delivery, InboundMessage, Responder, Subscription, SubscriptionId, Transport,
    TransportPtr,
};

struct Subscriber {
    id: SubscriptionId,
    tx: mpsc::Sender<Delivery>,
    dropped: AtomicU64,
}

impl Subscriber {
    fn offer(&self, topic: &str, msg: InboundMessage) {
        let pending = self.dropped.load(Ordering::Relaxed);
        if pending > 0 {
            match self.tx.try_send(Err(ObjLinkError::SlowConsumer(pending))) {
                Ok(()) => {
                    self.dropped.fetch_sub(pending, Ordering::Relaxed);
                }
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(TrySendError::Closed(_)) => return,
            }
        }

        match self.tx.try_send(Ok(msg)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(topic, sub = self.id.0, "subscriber queue full; message dropped");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

#[derive(Default)]
struct BrokerInner {
    topics: DashMap<String, Vec<Subscriber>>,
    seq: AtomicU64,
}

impl BrokerInner {
    fn deliver(&self, topic: &str, payload: Bytes, reply: Option<Responder>) -> usize {
        let delivered = {
            let Some(mut subs) = self.topics.get_mut(topic) else {
                tracing::debug!(topic, "no subscribers");
                return 0;
            };
            subs.retain(|s| !s.tx.is_closed());
            for sub in subs.iter() {
                sub.offer(topic, InboundMessage::new(topic, payload.clone(), reply.clone()));
            }
            subs.len()
        };
        if delivered == 0 {
            self.topics.remove_if(topic, |_, subs| subs.is_empty());
        }
        delivered
    }

    /// True while `id` is registered and its receiver is still alive.
    fn is_live(&self, id: SubscriptionId) -> bool {
        self.topics
            .iter()
            .any(|e| e.value().iter().any(|s| s.id == id && !s.tx.is_closed()))
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        let mut removed = false;
        self.topics.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|s| s.id != id);
            removed |= subs.len() != before;
            !subs.is_empty()
        });
        removed
    }

    fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|s| s.len()).unwrap_or(0)
    }
}

/// Shared in-process broker. Clones refer to the same topic namespace.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner.subscriber_count(topic)
    }

    /// Open a handle directly, bypassing config.
    pub fn handle(&self, address: impl Into<String>, capacity: usize) -> MemoryTransport {
        MemoryTransport {
            broker: Arc::clone(&self.inner),
            address: address.into(),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
            owned: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self, broker: &BrokerSection) -> Result<TransportPtr> {
        if !broker.address.starts_with(MEMORY_SCHEME) {
            return Err(ObjLinkError::TransportUnavailable(format!(
                "unsupported broker address: {}",
                broker.address
            )));
        }
        tracing::info!(address = %broker.address, "memory broker handle opened");
        Ok(Arc::new(self.handle(broker.address.clone(), broker.subscription_capacity)))
    }
}

/// One connection's handle onto a `MemoryBroker`.
pub struct MemoryTransport {
    broker: Arc<BrokerInner>,
    address: String,
    capacity: usize,
    closed: AtomicBool,
    owned: Mutex<Vec<SubscriptionId>>,
}

impl MemoryTransport {
    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ObjLinkError::TransportUnavailable(format!(
                "connection to {} is closed",
                self.address
            )));
        }
        Ok(())
    }

    fn owned(&self) -> std::sync::MutexGuard<'_, Vec<SubscriptionId>> {
        self.owned.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn address(&self) -> &str {
        &self.address
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        self.ensure_open()?;
        let id = SubscriptionId(self.broker.seq.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::channel(self.capacity);

        self.broker
            .topics
            .entry(topic.to_string())
            .or_insert_with(Vec::new)
            .push(Subscriber {
                id,
                tx,
                dropped: AtomicU64::new(0),
            });
        {
            let mut owned = self.owned();
            owned.retain(|s| {
                let live = self.broker.is_live(*s);
                if !live {
                    self.broker.remove(*s);
                }
                live
            });
            owned.push(id);
        }

        tracing::debug!(topic, sub = id.0, "subscribed");
        Ok(Subscription {
            id,
            topic: topic.to_string(),
            deliveries: rx,
        })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.owned().retain(|s| *s != id);
        if self.broker.remove(id) {
            tracing::debug!(sub = id.0, "unsubscribed");
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        self.ensure_open()?;
        self.broker.deliver(topic, payload, None);
        Ok(())
    }

    async fn request(&self, topic: &str, payload: Bytes, timeout: Duration) -> Result<Bytes> {
        self.ensure_open()?;
        let (tx, mut rx) = mpsc::channel(1);
        self.broker
            .deliver(topic, payload, Some(Responder::new(tx.clone())));

        // `tx` stays alive until the deadline so a missing responder reads as a timeout.
        let outcome = tokio::time::timeout(timeout, rx.recv()).await;
        drop(tx);
        match outcome {
            Ok(Some(reply)) => Ok(reply),
            _ => Err(ObjLinkError::Timeout {
                topic: topic.to_string(),
                member: String::new(),
            }),
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let owned: Vec<SubscriptionId> = std::mem::take(&mut *self.owned());
        for id in owned {
            self.broker.remove(id);
        }
        tracing::info!(address = %self.address, "memory broker handle closed");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn owned_ids_of_dropped_subscriptions_are_pruned() {
        let broker = MemoryBroker::new();
        let t = broker.handle("memory://test", 4);

        let first = t.subscribe("demo.a").await.unwrap();
        drop(first);
        let _second = t.subscribe("demo.b").await.unwrap();

        assert_eq!(t.owned().len(), 1);
        assert_eq!(broker.subscriber_count("demo.a"), 0);
        assert!(!broker.inner.topics.contains_key("demo.a"));
    }

    #[tokio::test]
    async fn delivery_drops_empty_topics() {
        let broker = MemoryBroker::new();
        let t = broker.handle("memory://test", 4);

        let sub = t.subscribe("demo.calc").await.unwrap();
        drop(sub);
        t.publish("demo.calc", Bytes::from_static(b"{}")).await.unwrap();

        assert!(!broker.inner.topics.contains_key("demo.calc"));
    }
}
