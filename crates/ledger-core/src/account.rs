//! Account identifiers and balances.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Caller-assigned account identifier. Also the balance row's primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AccountId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Current balance of one account, in indivisible minor units.
///
/// The balance never goes below zero: `debit` refuses instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// The account this balance belongs to.
    pub account_id: AccountId,
    /// Current balance.
    pub balance: i64,
}

impl Balance {
    /// A freshly opened account.
    #[must_use]
    pub fn opened(account_id: AccountId) -> Self {
        Self {
            account_id,
            balance: 0,
        }
    }

    /// Returns the balance after adding `amount`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::BalanceOverflow` if the sum does not fit.
    pub fn credit(self, amount: i64) -> Result<Self, LedgerError> {
        let balance = self
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow(self.account_id))?;
        Ok(Self { balance, ..self })
    }

    /// Returns the balance after subtracting `amount`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NegativeBalance` if the result would be below
    /// zero.
    pub fn debit(self, amount: i64) -> Result<Self, LedgerError> {
        match self.balance.checked_sub(amount) {
            Some(balance) if balance >= 0 => Ok(Self { balance, ..self }),
            _ => Err(LedgerError::NegativeBalance {
                account_id: self.account_id,
                balance: self.balance,
                amount,
            }),
        }
    }
}

/// Rejects amounts below zero. Pure input validation, no I/O.
///
/// # Errors
///
/// Returns `LedgerError::NegativeAmount` for `amount < 0`.
pub fn ensure_non_negative(amount: i64) -> Result<i64, LedgerError> {
    if amount < 0 {
        return Err(LedgerError::NegativeAmount(amount));
    }
    Ok(amount)
}
