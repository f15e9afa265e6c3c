//! Ledger Core — shared domain types and capability traits.
//!
//! This crate defines accounts, operations, events and commands, the error
//! taxonomy, and the storage and messaging seams the ledger service is
//! written against. It contains no infrastructure code.

pub mod account;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod messaging;
pub mod notification;
pub mod operation;
pub mod store;
