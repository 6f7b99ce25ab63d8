//! Message bus seam
//!
//! Transport to the real bus lives outside this service; the listener only
//! sees these traits. The in-memory implementation backs tests and the
//! default binary wiring.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

/// One inbound message with its routing content type and delivery tag.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub content_type: String,
    pub body: Vec<u8>,
    pub tag: u64,
}

/// Consumer side of the input queue.
#[async_trait]
pub trait BusConsumer: Send + Sync {
    /// Next delivery, or None when the queue is closed.
    async fn receive(&self) -> Option<Delivery>;
    async fn ack(&self, tag: u64);
    /// Negative acknowledgement; `requeue` returns the message to the queue.
    async fn nack(&self, tag: u64, requeue: bool);
}

/// Sink for permanently failed messages.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn publish(&self, delivery: &Delivery, reason: &str);
}

/// In-process queue with ack/nack bookkeeping.
pub struct InMemoryBus {
    tx: mpsc::UnboundedSender<Delivery>,
    rx: Mutex<mpsc::UnboundedReceiver<Delivery>>,
    in_flight: Mutex<HashMap<u64, Delivery>>,
    next_tag: AtomicU64,
}

impl InMemoryBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            in_flight: Mutex::new(HashMap::new()),
            next_tag: AtomicU64::new(1),
        }
    }

    /// Enqueue a message as the upstream transport would.
    pub fn publish(&self, content_type: impl Into<String>, body: Vec<u8>) {
        let delivery = Delivery {
            content_type: content_type.into(),
            body,
            tag: self.next_tag.fetch_add(1, Ordering::SeqCst),
        };
        if self.tx.send(delivery).is_err() {
            warn!("in-memory bus receiver dropped, message lost");
        }
    }

    /// Messages neither acked nor dropped yet.
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusConsumer for InMemoryBus {
    async fn receive(&self) -> Option<Delivery> {
        let delivery = self.rx.lock().await.recv().await?;
        self.in_flight
            .lock()
            .await
            .insert(delivery.tag, delivery.clone());
        Some(delivery)
    }

    async fn ack(&self, tag: u64) {
        self.in_flight.lock().await.remove(&tag);
    }

    async fn nack(&self, tag: u64, requeue: bool) {
        let delivery = self.in_flight.lock().await.remove(&tag);
        if requeue {
            if let Some(delivery) = delivery {
                if self.tx.send(delivery).is_err() {
                    warn!("in-memory bus receiver dropped, requeue lost");
                }
            }
        }
    }
}

/// Dead-letter sink that records entries and logs them.
#[derive(Default)]
pub struct InMemoryDeadLetter {
    entries: Mutex<Vec<(Delivery, String)>>,
}

impl InMemoryDeadLetter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<(Delivery, String)> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetter {
    async fn publish(&self, delivery: &Delivery, reason: &str) {
        warn!(
            content_type = %delivery.content_type,
            reason = %reason,
            "message dead-lettered"
        );
        self.entries
            .lock()
            .await
            .push((delivery.clone(), reason.to_string()));
    }
}
