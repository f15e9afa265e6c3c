//! Ledger Service — applies balance-affecting commands transactionally and
//! hands committed events to the messaging layer.
//!
//! Every mutating operation follows the same shape: validate, then inside one
//! store transaction lock the affected rows, check, mutate and append one
//! event, commit, and finally enqueue the event for publishing. Publishing
//! and confirmation run on the notification pipeline, outside the
//! transaction and off the caller's path.

pub mod broker;
pub mod config;
pub mod consumer;
pub mod pipeline;
pub mod service;

pub use broker::{DEFAULT_SUBJECT, Delivery, InProcessBroker, spawn_logging_subscriber};
pub use config::LedgerConfig;
pub use consumer::CommandConsumer;
pub use pipeline::{NotificationQueue, PipelineHandle, spawn_notification_pipeline};
pub use service::LedgerService;
