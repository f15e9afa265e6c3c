//! The transactional ledger core.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use ledger_core::account::{AccountId, Balance, ensure_non_negative};
use ledger_core::clock::Clock;
use ledger_core::error::LedgerError;
use ledger_core::event::{Event, NewEvent};
use ledger_core::notification::NotificationIdGenerator;
use ledger_core::operation::Operation;
use ledger_core::store::{BalanceStore, EventLog, LedgerStore, LedgerTransaction};
use tracing::{error, info, instrument, warn};

use crate::config::LedgerConfig;
use crate::pipeline::NotificationQueue;

/// Applies ledger operations with all-or-nothing semantics.
///
/// Operations on disjoint accounts run fully in parallel; operations on the
/// same account serialize on its row lock. Balances are never cached: every
/// read goes through the store.
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    notification_ids: Arc<dyn NotificationIdGenerator>,
    notifications: NotificationQueue,
    config: LedgerConfig,
}

impl fmt::Debug for LedgerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerService")
            .field("notifications", &self.notifications)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LedgerService {
    /// Create a new service.
    #[must_use]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        notification_ids: Arc<dyn NotificationIdGenerator>,
        notifications: NotificationQueue,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            clock,
            notification_ids,
            notifications,
            config,
        }
    }

    /// Opens `account_id` with a zero balance.
    ///
    /// # Errors
    ///
    /// `LedgerError::AlreadyExists` if the account is already open.
    pub async fn open_account(&self, account_id: AccountId) -> Result<Event, LedgerError> {
        self.execute(Operation::Open { account_id }).await
    }

    /// Adds `amount` to `account_id`.
    ///
    /// # Errors
    ///
    /// `LedgerError::NegativeAmount` or `LedgerError::UserNotFound`.
    pub async fn deposit(&self, account_id: AccountId, amount: i64) -> Result<Event, LedgerError> {
        self.execute(Operation::Deposit { account_id, amount }).await
    }

    /// Removes `amount` from `account_id`.
    ///
    /// # Errors
    ///
    /// `LedgerError::NegativeAmount`, `LedgerError::UserNotFound` or
    /// `LedgerError::NegativeBalance`.
    pub async fn withdraw(&self, account_id: AccountId, amount: i64) -> Result<Event, LedgerError> {
        self.execute(Operation::Withdraw { account_id, amount }).await
    }

    /// Moves `amount` from `from` to `to`. The destination is never created
    /// implicitly.
    ///
    /// # Errors
    ///
    /// `LedgerError::NegativeAmount`, `LedgerError::UserNotFound` for either
    /// side, or `LedgerError::NegativeBalance` for the source.
    pub async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: i64,
    ) -> Result<Event, LedgerError> {
        self.execute(Operation::Transfer { from, to, amount }).await
    }

    /// Current balance of `account_id`, read without locks.
    ///
    /// # Errors
    ///
    /// `LedgerError::UserNotFound` if the account was never opened.
    pub async fn get_balance(&self, account_id: AccountId) -> Result<Balance, LedgerError> {
        self.within_deadline(self.store.get_balance(account_id))
            .await
    }

    /// Audit trail of `account_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Storage errors only; an unknown account has an empty trail.
    pub async fn events_for_account(&self, account_id: AccountId) -> Result<Vec<Event>, LedgerError> {
        self.within_deadline(self.store.list_by_account(account_id))
            .await
    }

    /// Re-enqueues unconfirmed events for publishing and returns how many
    /// were accepted by the notification queue.
    ///
    /// Delivery is at-least-once. An event still queued or awaiting its
    /// acknowledgement is published again and takes the newer message id;
    /// the older acknowledgement then matches no event and is only logged.
    ///
    /// # Errors
    ///
    /// Storage errors from listing the unconfirmed events.
    #[instrument(skip(self))]
    pub async fn redrive_unconfirmed(&self) -> Result<usize, LedgerError> {
        let pending = self
            .within_deadline(self.store.list_unconfirmed(self.config.redrive_batch_size))
            .await?;
        let total = pending.len();
        let enqueued = pending
            .into_iter()
            .filter(|event| self.notifications.enqueue(event.clone()))
            .count();
        info!(total, enqueued, "redrove unconfirmed events");
        Ok(enqueued)
    }

    /// Validates and applies `operation`, then enqueues its event for
    /// publishing. Publishing never affects the outcome.
    ///
    /// # Errors
    ///
    /// Validation errors before any I/O, business rejections and storage
    /// failures from the transaction, or `LedgerError::Timeout`. On error
    /// nothing was written.
    #[instrument(skip(self))]
    pub async fn execute(&self, operation: Operation) -> Result<Event, LedgerError> {
        let result = match validate(&operation) {
            Ok(()) => {
                self.within_deadline(self.apply_in_transaction(operation))
                    .await
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(event) => {
                info!(event_id = event.id, "operation applied");
                self.notifications.enqueue(event.clone());
                Ok(event)
            }
            Err(err) if err.is_business_rejection() || matches!(err, LedgerError::NegativeAmount(_)) => {
                info!(error = %err, "operation rejected");
                Err(err)
            }
            Err(err) => {
                error!(error = %err, "operation failed");
                Err(err)
            }
        }
    }

    /// Bounds `fut` by the configured transaction timeout. Expiry drops the
    /// future, which rolls back any transaction it holds.
    async fn within_deadline<T>(
        &self,
        fut: impl Future<Output = Result<T, LedgerError>>,
    ) -> Result<T, LedgerError> {
        tokio::time::timeout(self.config.transaction_timeout, fut)
            .await
            .map_err(|_| LedgerError::Timeout)?
    }

    async fn apply_in_transaction(&self, operation: Operation) -> Result<Event, LedgerError> {
        let mut tx = self.store.begin().await?;
        match self.apply(tx.as_mut(), operation).await {
            Ok(event) => {
                tx.commit().await?;
                Ok(event)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn apply(
        &self,
        tx: &mut dyn LedgerTransaction,
        operation: Operation,
    ) -> Result<Event, LedgerError> {
        match operation {
            Operation::Open { account_id } => {
                if lock_existing(tx, account_id).await?.is_some() {
                    return Err(LedgerError::AlreadyExists(account_id));
                }
                tx.create(account_id).await?;
            }
            Operation::Deposit { account_id, amount } => {
                let credited = tx.read(account_id, true).await?.credit(amount)?;
                tx.write(account_id, credited.balance).await?;
            }
            Operation::Withdraw { account_id, amount } => {
                let debited = tx.read(account_id, true).await?.debit(amount)?;
                tx.write(account_id, debited.balance).await?;
            }
            Operation::Transfer { from, to, amount } => {
                move_funds(tx, from, to, amount).await?;
            }
        }

        let event = NewEvent {
            operation,
            created_time: self.clock.now(),
            notification_id: self.notification_ids.next_id(),
        };
        tx.append(event).await
    }
}

fn validate(operation: &Operation) -> Result<(), LedgerError> {
    if let Some(amount) = operation.amount() {
        ensure_non_negative(amount)?;
    }
    Ok(())
}

/// Locks the row of `account_id` if it exists.
async fn lock_existing(
    tx: &mut dyn LedgerTransaction,
    account_id: AccountId,
) -> Result<Option<Balance>, LedgerError> {
    match tx.read(account_id, true).await {
        Ok(balance) => Ok(Some(balance)),
        Err(LedgerError::UserNotFound(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Debits `from` and credits `to`.
///
/// Both rows are locked lowest id first, whatever the direction, so two
/// transfers between the same pair of accounts can never wait on each other
/// in a cycle. Checks still run source first: a missing source, then its
/// funds, then a missing destination.
async fn move_funds(
    tx: &mut dyn LedgerTransaction,
    from: AccountId,
    to: AccountId,
    amount: i64,
) -> Result<(), LedgerError> {
    let (low, high) = if from <= to { (from, to) } else { (to, from) };
    let low_balance = lock_existing(tx, low).await?;
    let high_balance = if high == low {
        low_balance
    } else {
        lock_existing(tx, high).await?
    };
    let (source, destination) = if from <= to {
        (low_balance, high_balance)
    } else {
        (high_balance, low_balance)
    };

    let debited = source.ok_or(LedgerError::UserNotFound(from))?.debit(amount)?;
    let destination = destination.ok_or(LedgerError::UserNotFound(to))?;
    if from == to {
        return Ok(());
    }
    let credited = destination.credit(amount)?;

    tx.write(from, debited.balance).await?;
    tx.write(to, credited.balance).await?;
    Ok(())
}
