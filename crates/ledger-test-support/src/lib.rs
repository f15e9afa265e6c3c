//! Shared test fakes and utilities for the double-entry ledger.

mod clock;
mod notification;
mod publisher;
mod store;

pub use clock::FixedClock;
pub use notification::SequenceNotificationIds;
pub use publisher::{FailingPublisher, PublishedEvent, RecordingPublisher};
pub use store::{FailingLedgerStore, InMemoryLedgerStore};
