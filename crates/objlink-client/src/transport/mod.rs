//! Broker transport contract.
//!
//! The object layer only needs topic publish, topic subscribe with a
//! per-message delivery stream, request with timeout, and the ability to
//! answer a received message. `memory` provides an in-process broker that
//! implements the contract.

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use objlink_core::error::{ObjLinkError, Result};

use crate::config::BrokerSection;

pub use memory::MemoryBroker;

/// Broker-assigned subscription id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// One item on a subscription stream: a message, or a delivery error
/// (e.g. messages dropped for a slow consumer).
pub type Delivery = Result<InboundMessage>;

/// Active subscription: id plus the delivery stream.
pub struct Subscription {
    pub id: SubscriptionId,
    pub topic: String,
    pub deliveries: mpsc::Receiver<Delivery>,
}

/// Reply channel attached to a request message.
#[derive(Debug, Clone)]
pub struct Responder {
    tx: mpsc::Sender<Bytes>,
}

impl Responder {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    /// First reply wins; later replies to the same request are discarded.
    pub fn respond(&self, payload: Bytes) -> Result<()> {
        match self.tx.try_send(payload) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ObjLinkError::TransportUnavailable(
                "requester is no longer waiting for a reply".into(),
            )),
        }
    }
}

/// Message received on a subscribed topic.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    reply: Option<Responder>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: Bytes, reply: Option<Responder>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            reply,
        }
    }

    pub fn has_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Answer the originating request.
    pub async fn respond(&self, payload: Bytes) -> Result<()> {
        let reply = self.reply.as_ref().ok_or(ObjLinkError::NoReplyChannel)?;
        reply.respond(payload)
    }
}

/// Live broker handle shared by every object of one connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Address this handle is connected to.
    fn address(&self) -> &str;
    fn is_closed(&self) -> bool;

    async fn subscribe(&self, topic: &str) -> Result<Subscription>;
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()>;
    /// Publish with a reply channel and wait for the first reply.
    /// Fails with `ObjLinkError::Timeout` when nothing answers in time.
    async fn request(&self, topic: &str, payload: Bytes, timeout: Duration) -> Result<Bytes>;
    /// Release the handle; every later call fails with `TransportUnavailable`.
    async fn close(&self);
}

pub type TransportPtr = Arc<dyn Transport>;

/// Establishes transport handles (`connect(address) -> handle`).
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, broker: &BrokerSection) -> Result<TransportPtr>;
}
