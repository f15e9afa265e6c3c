//! Inbound commands as they arrive from the messaging layer.

use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::error::LedgerError;
use crate::operation::{EventType, Operation};

/// Wire shape of an inbound command.
///
/// The type is kept as a string so that an unrecognised type reaches
/// dispatch and is reported as `UnknownCommand` instead of failing
/// deserialization of the whole message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Caller-assigned command id, used for logging only.
    pub id: i64,
    /// One of `open`, `deposit`, `withdraw`, `transfer`.
    #[serde(rename = "type")]
    pub command_type: String,
    /// Source account; the only account for non-transfer commands.
    pub from_user_id: AccountId,
    /// Destination account, transfers only.
    #[serde(default)]
    pub to_user_id: Option<AccountId>,
    /// Amount in minor units; absent for `open`.
    #[serde(default)]
    pub amount: Option<i64>,
}

impl Command {
    /// Resolves the wire command into the operation it requests.
    ///
    /// Extra fields (an amount on `open`, a destination on `deposit`) are
    /// ignored; missing required fields are not.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UnknownCommand` for an unrecognised type and
    /// `LedgerError::MissingField` when a required field is absent.
    pub fn operation(&self) -> Result<Operation, LedgerError> {
        let event_type: EventType = self.command_type.parse()?;
        let account_id = self.from_user_id;
        let amount = || {
            self.amount.ok_or(LedgerError::MissingField {
                command: event_type.as_str(),
                field: "amount",
            })
        };

        Ok(match event_type {
            EventType::Open => Operation::Open { account_id },
            EventType::Deposit => Operation::Deposit {
                account_id,
                amount: amount()?,
            },
            EventType::Withdraw => Operation::Withdraw {
                account_id,
                amount: amount()?,
            },
            EventType::Transfer => Operation::Transfer {
                from: account_id,
                to: self.to_user_id.ok_or(LedgerError::MissingField {
                    command: "transfer",
                    field: "to_user_id",
                })?,
                amount: amount()?,
            },
        })
    }
}
