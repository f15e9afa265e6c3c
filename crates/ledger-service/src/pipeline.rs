//! Notification pipeline.
//!
//! Committed events flow through a bounded queue to a single worker task.
//! For each event the worker publishes it, then records the messaging id on
//! the event in a fresh transaction. Acknowledgements from the messaging
//! layer are consumed by the same task, so an acknowledgement is always
//! processed after the id it refers to has been recorded. An id that could
//! not be recorded does not identify its event, so its acknowledgement is
//! dropped and the event stays unconfirmed until redriven.

use std::collections::HashSet;
use std::sync::Arc;

use ledger_core::clock::Clock;
use ledger_core::error::LedgerError;
use ledger_core::event::Event;
use ledger_core::messaging::{Ack, AckReceiver, AckSender, Publisher};
use ledger_core::store::{EventLog, LedgerStore};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Sending side of the commit → publish queue.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    sender: mpsc::Sender<Event>,
}

impl NotificationQueue {
    /// Creates a queue holding at most `capacity` events and returns the
    /// receiving end.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Hands `event` to the pipeline without waiting. Returns `false` when
    /// the queue is full or closed; the event stays unconfirmed in the store
    /// and can be redriven later.
    pub fn enqueue(&self, event: Event) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                error!(event_id = event.id, "notification queue full, event left unconfirmed");
                false
            }
            Err(TrySendError::Closed(event)) => {
                error!(event_id = event.id, "notification pipeline stopped, event left unconfirmed");
                false
            }
        }
    }
}

/// Handle to the running pipeline worker.
#[derive(Debug)]
pub struct PipelineHandle {
    join: JoinHandle<()>,
}

impl PipelineHandle {
    /// Waits for the worker to drain and stop.
    ///
    /// The worker stops once every `NotificationQueue` clone has been
    /// dropped, the queued events have been published, and every
    /// outstanding acknowledgement sender has gone away.
    pub async fn shutdown(self) {
        if let Err(err) = self.join.await {
            error!(error = %err, "notification worker panicked");
        }
        info!("notification pipeline stopped");
    }
}

/// Starts the notification worker and returns the queue feeding it.
pub fn spawn_notification_pipeline(
    store: Arc<dyn LedgerStore>,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,
    capacity: usize,
) -> (NotificationQueue, PipelineHandle) {
    let (queue, events) = NotificationQueue::channel(capacity);
    let worker = NotificationWorker {
        store,
        publisher,
        clock,
        unrecorded: HashSet::new(),
    };
    let join = tokio::spawn(worker.run(events));
    (queue, PipelineHandle { join })
}

struct NotificationWorker {
    store: Arc<dyn LedgerStore>,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,
    // Message ids whose stamp failed; their acks must not confirm anything.
    unrecorded: HashSet<String>,
}

impl NotificationWorker {
    async fn run(mut self, mut events: mpsc::Receiver<Event>) {
        let (ack_sender, mut acks): (AckSender, AckReceiver) = mpsc::unbounded_channel();

        loop {
            tokio::select! {
                biased;
                Some(ack) = acks.recv() => self.confirm(ack).await,
                next = events.recv() => match next {
                    Some(event) => self.dispatch(event, ack_sender.clone()).await,
                    None => break,
                },
            }
        }

        // Late acknowledgements still count until the last sender is gone.
        drop(ack_sender);
        while let Some(ack) = acks.recv().await {
            self.confirm(ack).await;
        }
    }

    #[instrument(skip(self, event, acks), fields(event_id = event.id))]
    async fn dispatch(&mut self, event: Event, acks: AckSender) {
        let message_id = match self.publisher.publish(&event, acks).await {
            Ok(message_id) => message_id,
            Err(err) => {
                error!(error = %err, "publish failed, event left unconfirmed");
                return;
            }
        };

        match self.record_message_id(&event, &message_id).await {
            Ok(()) => debug!(%message_id, "event published"),
            Err(err) => {
                error!(error = %err, %message_id, "failed to record message id, event left unconfirmed");
                self.unrecorded.insert(message_id);
            }
        }
    }

    async fn record_message_id(&self, event: &Event, message_id: &str) -> Result<(), LedgerError> {
        let mut tx = self.store.begin().await?;
        tx.stamp_notification_id(event, message_id).await?;
        tx.commit().await
    }

    #[instrument(skip(self, ack), fields(notification_id = %ack.notification_id))]
    async fn confirm(&mut self, ack: Ack) {
        if self.unrecorded.remove(&ack.notification_id) {
            warn!("acknowledgement for unrecorded message id ignored");
            return;
        }
        if let Err(reason) = ack.outcome {
            warn!(%reason, "delivery failed, event left unconfirmed");
            return;
        }
        match self
            .store
            .stamp_confirmed(&ack.notification_id, self.clock.now())
            .await
        {
            Ok(()) => debug!("delivery confirmed"),
            Err(err) => warn!(error = %err, "could not record confirmation"),
        }
    }
}
