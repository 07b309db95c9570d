//! # Event Bus
//!
//! Address-based messaging between workers on the same runtime.
//!
//! - `send` delivers to one consumer, rotating across live consumers
//! - `publish` delivers to every live consumer
//! - `request` sends to one consumer and waits for its reply
//!
//! Each consumer has a bounded mailbox. Delivery never blocks: a full mailbox
//! is reported as backpressure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EventBusError {
    #[error("No consumers registered for address {address}")]
    NoConsumers { address: String },

    #[error("Consumer mailbox full for address {address} (capacity {capacity})")]
    Backpressure { address: String, capacity: usize },

    #[error("No reply from {address} within {timeout_ms}ms")]
    ReplyTimeout { address: String, timeout_ms: u64 },

    #[error("Consumer at {address} dropped the request without replying")]
    ReplyDropped { address: String },
}

/// Message delivered to a consumer
#[derive(Debug)]
pub struct Envelope {
    pub address: String,
    pub body: Value,
    pub headers: HashMap<String, String>,
    reply_to: Option<oneshot::Sender<Value>>,
}

impl Envelope {
    fn new(address: &str, body: Value, reply_to: Option<oneshot::Sender<Value>>) -> Self {
        Self {
            address: address.to_string(),
            body,
            headers: HashMap::new(),
            reply_to,
        }
    }

    pub fn expects_reply(&self) -> bool {
        self.reply_to.is_some()
    }

    /// Answer a `request`. Returns false when no reply is expected or the requester is gone.
    pub fn reply(&mut self, body: Value) -> bool {
        match self.reply_to.take() {
            Some(sender) => sender.send(body).is_ok(),
            None => false,
        }
    }
}

/// Receiving end registered at an address
#[derive(Debug)]
pub struct MessageConsumer {
    address: String,
    receiver: mpsc::Receiver<Envelope>,
}

impl MessageConsumer {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }
}

#[derive(Debug, Default)]
struct AddressConsumers {
    senders: Vec<mpsc::Sender<Envelope>>,
    next: usize,
}

impl AddressConsumers {
    fn prune(&mut self) {
        self.senders.retain(|sender| !sender.is_closed());
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    consumers: Arc<DashMap<String, AddressConsumers>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            consumers: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a consumer at `address`
    pub fn consumer(&self, address: &str) -> MessageConsumer {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.consumers
            .entry(address.to_string())
            .or_default()
            .senders
            .push(sender);

        debug!(address = %address, "Registered event bus consumer");
        MessageConsumer {
            address: address.to_string(),
            receiver,
        }
    }

    /// Live consumers at `address`
    pub fn consumer_count(&self, address: &str) -> usize {
        match self.consumers.get_mut(address) {
            Some(mut entry) => {
                entry.prune();
                entry.senders.len()
            }
            None => 0,
        }
    }

    /// Point-to-point delivery to the next consumer in rotation
    pub fn send(&self, address: &str, body: Value) -> Result<(), EventBusError> {
        self.deliver_one(Envelope::new(address, body, None))
    }

    /// Deliver to every live consumer; returns how many received it
    pub fn publish(&self, address: &str, body: Value) -> usize {
        let Some(mut entry) = self.consumers.get_mut(address) else {
            return 0;
        };
        entry.prune();

        entry
            .senders
            .iter()
            .filter(|sender| {
                sender
                    .try_send(Envelope::new(address, body.clone(), None))
                    .is_ok()
            })
            .count()
    }

    /// Send and wait for the consumer's reply
    pub async fn request(
        &self,
        address: &str,
        body: Value,
        timeout: Duration,
    ) -> Result<Value, EventBusError> {
        let (reply_sender, reply_receiver) = oneshot::channel();
        self.deliver_one(Envelope::new(address, body, Some(reply_sender)))?;

        match tokio::time::timeout(timeout, reply_receiver).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(EventBusError::ReplyDropped {
                address: address.to_string(),
            }),
            Err(_) => Err(EventBusError::ReplyTimeout {
                address: address.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    fn deliver_one(&self, envelope: Envelope) -> Result<(), EventBusError> {
        let address = envelope.address.clone();
        let no_consumers = || EventBusError::NoConsumers {
            address: address.clone(),
        };

        let mut entry = self.consumers.get_mut(&address).ok_or_else(no_consumers)?;
        entry.prune();
        if entry.senders.is_empty() {
            return Err(no_consumers());
        }

        let index = entry.next % entry.senders.len();
        entry.next = entry.next.wrapping_add(1);

        entry.senders[index]
            .try_send(envelope)
            .map_err(|error| match error {
                mpsc::error::TrySendError::Full(_) => EventBusError::Backpressure {
                    address: address.clone(),
                    capacity: self.capacity,
                },
                mpsc::error::TrySendError::Closed(_) => no_consumers(),
            })
    }
}
