//! Messaging-layer seam.
//!
//! Publishing is two-phase. `Publisher::publish` hands the event to the
//! messaging layer and returns its message id at once. Delivery is
//! acknowledged later by sending an `Ack` carrying that id on the channel
//! passed to `publish`.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::LedgerError;
use crate::event::Event;

/// Sending half of the acknowledgement channel. Unbounded so that
/// acknowledging never blocks the messaging layer.
pub type AckSender = mpsc::UnboundedSender<Ack>;

/// Receiving half of the acknowledgement channel.
pub type AckReceiver = mpsc::UnboundedReceiver<Ack>;

/// Delivery outcome reported by the messaging layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// The id returned by `Publisher::publish`.
    pub notification_id: String,
    /// `Err` carries the messaging layer's reason for a failed delivery.
    pub outcome: Result<(), String>,
}

impl Ack {
    /// A successful delivery.
    #[must_use]
    pub fn delivered(notification_id: impl Into<String>) -> Self {
        Self {
            notification_id: notification_id.into(),
            outcome: Ok(()),
        }
    }

    /// A failed delivery.
    #[must_use]
    pub fn failed(notification_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            notification_id: notification_id.into(),
            outcome: Err(reason.into()),
        }
    }
}

/// Outbound notification channel to external subscribers.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes `event` and returns the messaging-layer id. The outcome of
    /// the delivery is reported on `acks` with the same id.
    ///
    /// # Errors
    ///
    /// `LedgerError::Messaging` if the message could not be handed over.
    async fn publish(&self, event: &Event, acks: AckSender) -> Result<String, LedgerError>;
}
