//! Ledger error taxonomy.

use thiserror::Error;

use crate::account::AccountId;

/// Top-level ledger error type.
///
/// Variants fall into four groups: input validation (`NegativeAmount`,
/// `UnknownCommand`, `MissingField`), business-rule rejections detected
/// inside a transaction (`UserNotFound`, `AlreadyExists`, `NegativeBalance`,
/// `BalanceOverflow`), infrastructure failures (`Storage`, `Timeout`,
/// `Messaging`) and bookkeeping mismatches (`InvalidEvent`,
/// `UnknownNotification`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The requested amount is below zero.
    #[error("amount must not be negative: {0}")]
    NegativeAmount(i64),

    /// No balance row exists for the account.
    #[error("user not found: {0}")]
    UserNotFound(AccountId),

    /// A balance row already exists for the account.
    #[error("user already exists: {0}")]
    AlreadyExists(AccountId),

    /// Applying the operation would leave the account below zero.
    #[error("insufficient funds on account {account_id}: balance {balance}, requested {amount}")]
    NegativeBalance {
        /// The account that would go negative.
        account_id: AccountId,
        /// Its balance at the time of the check.
        balance: i64,
        /// The amount that was requested.
        amount: i64,
    },

    /// Crediting the account would overflow the balance type.
    #[error("balance overflow on account {0}")]
    BalanceOverflow(AccountId),

    /// A command carried a type the ledger does not know.
    #[error("unknown command type: {0}")]
    UnknownCommand(String),

    /// A command is missing a field its type requires.
    #[error("{command} command is missing `{field}`")]
    MissingField {
        /// The command type.
        command: &'static str,
        /// The absent field.
        field: &'static str,
    },

    /// A stored or incoming event violates the event shape rules.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// No event carries the given notification id.
    #[error("no event with notification id {0}")]
    UnknownNotification(String),

    /// The store transaction did not finish within the configured deadline.
    #[error("ledger transaction timed out")]
    Timeout,

    /// A storage/persistence error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A messaging-layer error.
    #[error("messaging error: {0}")]
    Messaging(String),
}

impl LedgerError {
    /// Returns `true` for expected, recoverable outcomes of a well-formed
    /// command that the ledger refused on business grounds.
    #[must_use]
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            Self::UserNotFound(_)
                | Self::AlreadyExists(_)
                | Self::NegativeBalance { .. }
                | Self::BalanceOverflow(_)
        )
    }

    /// Returns `true` when retrying the whole command may succeed. An aborted
    /// transaction leaves no partial state behind, so retrying is safe.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Timeout)
    }
}
