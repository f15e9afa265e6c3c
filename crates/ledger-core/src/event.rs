//! Ledger events — the append-only audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::error::LedgerError;
use crate::operation::{EventType, Operation};

/// An accepted operation about to be appended to the event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    /// What was done.
    pub operation: Operation,
    /// When the command was accepted.
    pub created_time: DateTime<Utc>,
    /// Provisional correlation token for the notification.
    pub notification_id: String,
}

/// A stored event row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EventRecord", into = "EventRecord")]
pub struct Event {
    /// Monotonic id assigned by the store.
    pub id: i64,
    /// What was done.
    pub operation: Operation,
    /// When the command was accepted.
    pub created_time: DateTime<Utc>,
    /// Correlation token; replaced by the messaging-layer id once published.
    pub notification_id: String,
    /// When the messaging layer acknowledged delivery.
    pub notification_confirmed_time: Option<DateTime<Utc>>,
}

impl Event {
    /// Builds the stored row for `new` with the store-assigned `id`.
    #[must_use]
    pub fn stored(id: i64, new: NewEvent) -> Self {
        Self {
            id,
            operation: new.operation,
            created_time: new.created_time,
            notification_id: new.notification_id,
            notification_confirmed_time: None,
        }
    }

    /// Shorthand for `self.operation.event_type()`.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.operation.event_type()
    }

    /// Whether the messaging layer has confirmed delivery.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.notification_confirmed_time.is_some()
    }
}

/// Flat wire shape of an event, using the storage column names as keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventRecord {
    id: i64,
    #[serde(rename = "type")]
    event_type: EventType,
    from_user_id: AccountId,
    #[serde(default)]
    to_user_id: Option<AccountId>,
    #[serde(default)]
    amount: Option<i64>,
    created_time: DateTime<Utc>,
    queue_id: String,
    #[serde(default)]
    queue_sent_time: Option<DateTime<Utc>>,
}

impl From<Event> for EventRecord {
    fn from(event: Event) -> Self {
        Self {
            id: event.id,
            event_type: event.operation.event_type(),
            from_user_id: event.operation.from_account_id(),
            to_user_id: event.operation.to_account_id(),
            amount: event.operation.amount(),
            created_time: event.created_time,
            queue_id: event.notification_id,
            queue_sent_time: event.notification_confirmed_time,
        }
    }
}

impl TryFrom<EventRecord> for Event {
    type Error = LedgerError;

    fn try_from(record: EventRecord) -> Result<Self, Self::Error> {
        let operation = Operation::from_columns(
            record.event_type,
            record.from_user_id,
            record.to_user_id,
            record.amount,
        )?;
        Ok(Self {
            id: record.id,
            operation,
            created_time: record.created_time,
            notification_id: record.queue_id,
            notification_confirmed_time: record.queue_sent_time,
        })
    }
}
