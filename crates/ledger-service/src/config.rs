//! Service-level configuration.

use std::time::Duration;

/// Tunables for `LedgerService` and its notification pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Upper bound on one store transaction, begin to commit.
    pub transaction_timeout: Duration,
    /// Bound of the commit → publish channel.
    pub notification_queue_capacity: usize,
    /// How many unconfirmed events one redrive pass re-enqueues.
    pub redrive_batch_size: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            transaction_timeout: Duration::from_secs(5),
            notification_queue_capacity: 1024,
            redrive_batch_size: 100,
        }
    }
}
