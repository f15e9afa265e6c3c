//! Notification correlation tokens.
//!
//! Every event carries a `notification_id` from the moment it is appended.
//! The column is `UNIQUE NOT NULL`, so the generator must make collisions
//! practically impossible; a collision surfaces as a storage error and the
//! whole command is aborted.

use uuid::Uuid;

/// Produces the provisional notification id stamped on a new event.
pub trait NotificationIdGenerator: Send + Sync {
    /// Returns a fresh, unique token.
    fn next_id(&self) -> String;
}

/// Random 128-bit tokens rendered as hyphenated UUIDv4 strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidNotificationIds;

impl NotificationIdGenerator for UuidNotificationIds {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
