//! Test publishers — mock `Publisher` implementations for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use ledger_core::error::LedgerError;
use ledger_core::event::Event;
use ledger_core::messaging::{Ack, AckSender, Publisher};

/// One call to `RecordingPublisher::publish`.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    /// The id handed back to the caller.
    pub message_id: String,
    /// The event as it was published.
    pub event: Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckMode {
    Deliver,
    Reject,
    Withhold,
}

/// A publisher that records every event and hands out `msg-1`, `msg-2`, ...
/// as message ids. By default each publish is acknowledged immediately as
/// delivered; `rejecting` acknowledges with a failure and `withholding`
/// never acknowledges. `reusing` hands out the same id on every publish.
#[derive(Debug)]
pub struct RecordingPublisher {
    mode: AckMode,
    reused_id: Option<String>,
    sequence: AtomicU64,
    published: Mutex<Vec<PublishedEvent>>,
}

impl RecordingPublisher {
    /// Acknowledges every publish as delivered.
    #[must_use]
    pub fn new() -> Self {
        Self::with_mode(AckMode::Deliver)
    }

    /// Acknowledges every publish as failed.
    #[must_use]
    pub fn rejecting() -> Self {
        Self::with_mode(AckMode::Reject)
    }

    /// Returns message ids but never acknowledges.
    #[must_use]
    pub fn withholding() -> Self {
        Self::with_mode(AckMode::Withhold)
    }

    /// Returns `message_id` for every publish and acknowledges it as
    /// delivered.
    #[must_use]
    pub fn reusing(message_id: impl Into<String>) -> Self {
        Self {
            reused_id: Some(message_id.into()),
            ..Self::new()
        }
    }

    fn with_mode(mode: AckMode) -> Self {
        Self {
            mode,
            reused_id: None,
            sequence: AtomicU64::new(0),
            published: Mutex::new(Vec::new()),
        }
    }

    /// Returns a snapshot of everything published so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn published(&self) -> Vec<PublishedEvent> {
        self.published.lock().unwrap().clone()
    }
}

impl Default for RecordingPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, event: &Event, acks: AckSender) -> Result<String, LedgerError> {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let message_id = self
            .reused_id
            .clone()
            .unwrap_or_else(|| format!("msg-{n}"));
        self.published.lock().unwrap().push(PublishedEvent {
            message_id: message_id.clone(),
            event: event.clone(),
        });

        // A closed channel only means nobody is waiting for the outcome.
        let _ = match self.mode {
            AckMode::Deliver => acks.send(Ack::delivered(&message_id)),
            AckMode::Reject => acks.send(Ack::failed(&message_id, "subscriber unavailable")),
            AckMode::Withhold => Ok(()),
        };

        Ok(message_id)
    }
}

/// A publisher that always fails to hand the message over.
#[derive(Debug)]
pub struct FailingPublisher;

#[async_trait]
impl Publisher for FailingPublisher {
    async fn publish(&self, _event: &Event, _acks: AckSender) -> Result<String, LedgerError> {
        Err(LedgerError::Messaging("broker unreachable".into()))
    }
}
