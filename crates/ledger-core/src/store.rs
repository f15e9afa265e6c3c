//! Storage capability traits.
//!
//! Balance and event mutations happen on a `LedgerTransaction` obtained from
//! `LedgerStore::begin`. The transaction is the caller-supplied context for
//! every `BalanceStore` and `EventLog` call; nothing it writes is visible to
//! others until `commit`. Dropping a transaction without committing rolls it
//! back and releases every row lock it holds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::account::{AccountId, Balance};
use crate::error::LedgerError;
use crate::event::{Event, NewEvent};

/// Balance rows, one per account.
#[async_trait]
pub trait BalanceStore: Send {
    /// Reads the balance of `account_id`. With `lock` set, takes an exclusive
    /// row lock held until the transaction ends.
    ///
    /// # Errors
    ///
    /// `LedgerError::UserNotFound` if no row exists.
    async fn read(&mut self, account_id: AccountId, lock: bool) -> Result<Balance, LedgerError>;

    /// Inserts a zero balance for `account_id`.
    ///
    /// # Errors
    ///
    /// `LedgerError::AlreadyExists` if the row exists, including when a
    /// concurrent transaction created it first.
    async fn create(&mut self, account_id: AccountId) -> Result<Balance, LedgerError>;

    /// Overwrites the balance. The caller must hold the row lock from a
    /// prior `read(.., true)` in the same transaction.
    ///
    /// # Errors
    ///
    /// `LedgerError::UserNotFound` if the row does not exist; a storage error
    /// if `new_balance` violates the non-negative constraint.
    async fn write(&mut self, account_id: AccountId, new_balance: i64) -> Result<(), LedgerError>;
}

/// Transactional half of the append-only event log.
#[async_trait]
pub trait EventLog: Send {
    /// Appends `event` and returns the stored row with its assigned id.
    ///
    /// # Errors
    ///
    /// A storage error if a referenced account does not exist or the
    /// notification id is already taken.
    async fn append(&mut self, event: NewEvent) -> Result<Event, LedgerError>;

    /// Replaces the notification id of `event`.
    ///
    /// # Errors
    ///
    /// A storage error if the id is already used by another event.
    async fn stamp_notification_id(
        &mut self,
        event: &Event,
        notification_id: &str,
    ) -> Result<(), LedgerError>;
}

/// One atomic unit of work spanning balances and events.
#[async_trait]
pub trait LedgerTransaction: BalanceStore + EventLog {
    /// Makes every write of this transaction visible and releases its locks.
    ///
    /// # Errors
    ///
    /// A storage error if the store refuses the commit; nothing is applied.
    async fn commit(self: Box<Self>) -> Result<(), LedgerError>;

    /// Discards every write of this transaction and releases its locks.
    ///
    /// # Errors
    ///
    /// A storage error if the store could not be reached.
    async fn rollback(self: Box<Self>) -> Result<(), LedgerError>;
}

/// Handle to the ledger's storage.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Opens a new transaction.
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, LedgerError>;

    /// Unlocked, non-transactional balance read.
    ///
    /// # Errors
    ///
    /// `LedgerError::UserNotFound` if no row exists.
    async fn get_balance(&self, account_id: AccountId) -> Result<Balance, LedgerError>;

    /// Events in which `account_id` is the source or destination, oldest
    /// first.
    async fn list_by_account(&self, account_id: AccountId) -> Result<Vec<Event>, LedgerError>;

    /// Events not yet confirmed by the messaging layer, oldest first.
    async fn list_unconfirmed(&self, limit: i64) -> Result<Vec<Event>, LedgerError>;

    /// Records delivery confirmation for the event carrying
    /// `notification_id`. Repeated confirmations keep the first time.
    ///
    /// # Errors
    ///
    /// `LedgerError::UnknownNotification` if no event carries the id.
    async fn stamp_confirmed(
        &self,
        notification_id: &str,
        confirmed_at: DateTime<Utc>,
    ) -> Result<(), LedgerError>;
}
