//! Balance-affecting operations.
//!
//! An `Operation` is what a command asks for and, once accepted, what its
//! event records. Field presence is encoded in the variants: only transfers
//! name a destination, and only `Open` has no amount.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::error::LedgerError;

/// Discriminant stored in the `type` column of the events table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Account opened.
    Open,
    /// Funds added.
    Deposit,
    /// Funds removed.
    Withdraw,
    /// Funds moved between two accounts.
    Transfer,
}

impl EventType {
    /// The wire/storage name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Deposit => "deposit",
            Self::Withdraw => "withdraw",
            Self::Transfer => "transfer",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "deposit" => Ok(Self::Deposit),
            "withdraw" => Ok(Self::Withdraw),
            "transfer" => Ok(Self::Transfer),
            other => Err(LedgerError::UnknownCommand(other.to_owned())),
        }
    }
}

/// One ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Create a zero balance for `account_id`.
    Open {
        /// The account to open.
        account_id: AccountId,
    },
    /// Add `amount` to `account_id`.
    Deposit {
        /// The credited account.
        account_id: AccountId,
        /// Amount in minor units.
        amount: i64,
    },
    /// Remove `amount` from `account_id`.
    Withdraw {
        /// The debited account.
        account_id: AccountId,
        /// Amount in minor units.
        amount: i64,
    },
    /// Move `amount` from `from` to `to`.
    Transfer {
        /// The debited account.
        from: AccountId,
        /// The credited account.
        to: AccountId,
        /// Amount in minor units.
        amount: i64,
    },
}

impl Operation {
    /// Rebuilds an operation from flat storage columns, enforcing the
    /// type/field-presence rules.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidEvent` when `to` or `amount` presence does
    /// not match `event_type`.
    pub fn from_columns(
        event_type: EventType,
        from: AccountId,
        to: Option<AccountId>,
        amount: Option<i64>,
    ) -> Result<Self, LedgerError> {
        match (event_type, to, amount) {
            (EventType::Open, None, None) => Ok(Self::Open { account_id: from }),
            (EventType::Deposit, None, Some(amount)) => Ok(Self::Deposit {
                account_id: from,
                amount,
            }),
            (EventType::Withdraw, None, Some(amount)) => Ok(Self::Withdraw {
                account_id: from,
                amount,
            }),
            (EventType::Transfer, Some(to), Some(amount)) => Ok(Self::Transfer { from, to, amount }),
            (event_type, to, amount) => Err(LedgerError::InvalidEvent(format!(
                "{event_type} event with to_user_id={to:?} amount={amount:?}"
            ))),
        }
    }

    /// The event type this operation is recorded as.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Open { .. } => EventType::Open,
            Self::Deposit { .. } => EventType::Deposit,
            Self::Withdraw { .. } => EventType::Withdraw,
            Self::Transfer { .. } => EventType::Transfer,
        }
    }

    /// The account stored in `from_user_id`.
    #[must_use]
    pub fn from_account_id(&self) -> AccountId {
        match *self {
            Self::Open { account_id }
            | Self::Deposit { account_id, .. }
            | Self::Withdraw { account_id, .. } => account_id,
            Self::Transfer { from, .. } => from,
        }
    }

    /// The account stored in `to_user_id`; transfers only.
    #[must_use]
    pub fn to_account_id(&self) -> Option<AccountId> {
        match *self {
            Self::Transfer { to, .. } => Some(to),
            _ => None,
        }
    }

    /// The amount; absent for `Open`.
    #[must_use]
    pub fn amount(&self) -> Option<i64> {
        match *self {
            Self::Open { .. } => None,
            Self::Deposit { amount, .. }
            | Self::Withdraw { amount, .. }
            | Self::Transfer { amount, .. } => Some(amount),
        }
    }

    /// Whether `account_id` is the source or destination.
    #[must_use]
    pub fn involves(&self, account_id: AccountId) -> bool {
        self.from_account_id() == account_id || self.to_account_id() == Some(account_id)
    }
}
