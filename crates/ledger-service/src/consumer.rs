//! Inbound command adapter.

use std::sync::Arc;

use ledger_core::command::Command;
use ledger_core::error::LedgerError;
use ledger_core::event::Event;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use crate::service::LedgerService;

/// Dispatches inbound commands to the `LedgerService`.
#[derive(Debug, Clone)]
pub struct CommandConsumer {
    service: Arc<LedgerService>,
}

impl CommandConsumer {
    /// Create a consumer in front of `service`.
    #[must_use]
    pub fn new(service: Arc<LedgerService>) -> Self {
        Self { service }
    }

    /// Handles one command. Failures are final for that command; nothing is
    /// retried.
    ///
    /// # Errors
    ///
    /// `LedgerError::UnknownCommand` or `LedgerError::MissingField` for a
    /// malformed command, otherwise whatever the service reports.
    #[instrument(skip(self, command), fields(command_id = command.id, command_type = %command.command_type))]
    pub async fn handle(&self, command: &Command) -> Result<Event, LedgerError> {
        debug!(?command, "received command");

        let result = match command.operation() {
            Ok(operation) => self.service.execute(operation).await,
            Err(err) => Err(err),
        };

        match &result {
            Ok(event) => info!(event_id = event.id, "command handled"),
            Err(err) => error!(error = %err, "error handling command"),
        }
        result
    }

    /// Handles commands from `commands` one at a time until every sender
    /// has been dropped.
    pub async fn run(self, mut commands: mpsc::Receiver<Command>) {
        while let Some(command) = commands.recv().await {
            // Outcome already logged by `handle`.
            let _ = self.handle(&command).await;
        }
        info!("command channel closed, consumer stopped");
    }
}
