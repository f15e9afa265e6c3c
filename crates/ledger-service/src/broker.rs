//! In-process messaging layer.
//!
//! `InProcessBroker` fans every published event out to local subscribers
//! over a `tokio::sync::broadcast` channel. It stands in for an external
//! broker when the service runs on its own.
//!
//! Message ids end up in the `UNIQUE` notification column, so they must never
//! repeat across broker instances: each broker mints them under a random
//! instance prefix, `<subject>:<instance>:<sequence>`.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use ledger_core::error::LedgerError;
use ledger_core::event::Event;
use ledger_core::messaging::{Ack, AckSender, Publisher};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Subject completed operations are published on.
pub const DEFAULT_SUBJECT: &str = "operation.completed";

/// One message as seen by a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// `<subject>:<instance>:<sequence>`.
    pub message_id: String,
    /// The published event.
    pub event: Event,
}

/// Broadcast-backed `Publisher`.
#[derive(Debug)]
pub struct InProcessBroker {
    subject: String,
    instance: String,
    sequence: AtomicU64,
    sender: broadcast::Sender<Delivery>,
}

impl InProcessBroker {
    /// Creates a broker on `subject`. Subscribers lagging more than
    /// `capacity` messages behind lose the oldest ones.
    #[must_use]
    pub fn new(subject: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            subject: subject.into(),
            instance: Uuid::new_v4().simple().to_string(),
            sequence: AtomicU64::new(0),
            sender,
        }
    }

    /// Subject this broker publishes on.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Receives every message published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Delivery> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl Publisher for InProcessBroker {
    async fn publish(&self, event: &Event, acks: AckSender) -> Result<String, LedgerError> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let message_id = format!("{}:{}:{sequence}", self.subject, self.instance);
        let delivery = Delivery {
            message_id: message_id.clone(),
            event: event.clone(),
        };

        let ack = match self.sender.send(delivery) {
            Ok(_) => Ack::delivered(&message_id),
            Err(_) => Ack::failed(&message_id, "no subscribers"),
        };
        // A closed channel only means nobody is waiting for the outcome.
        let _ = acks.send(ack);

        Ok(message_id)
    }
}

/// Logs every delivery received on `receiver` until the broker goes away.
pub fn spawn_logging_subscriber(mut receiver: broadcast::Receiver<Delivery>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(delivery) => info!(
                    message_id = %delivery.message_id,
                    event_id = delivery.event.id,
                    event_type = %delivery.event.event_type(),
                    "operation completed"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagged, messages dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
