//! Deterministic notification id generator.

use std::sync::atomic::{AtomicU64, Ordering};

use ledger_core::notification::NotificationIdGenerator;

/// Hands out `notification-1`, `notification-2`, ... in order.
#[derive(Debug, Default)]
pub struct SequenceNotificationIds {
    next: AtomicU64,
}

impl SequenceNotificationIds {
    /// Create a generator starting at `notification-1`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationIdGenerator for SequenceNotificationIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("notification-{n}")
    }
}
