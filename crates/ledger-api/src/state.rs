//! Shared application state.

use std::sync::Arc;

use ledger_service::{CommandConsumer, LedgerService};

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The ledger itself.
    pub service: Arc<LedgerService>,
    /// Dispatcher for wire commands.
    pub consumer: CommandConsumer,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(service: Arc<LedgerService>) -> Self {
        let consumer = CommandConsumer::new(Arc::clone(&service));
        Self { service, consumer }
    }
}
