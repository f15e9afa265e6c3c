//! Ledger database schema.
//!
//! The DDL is shared with the `migrations/` directory at the workspace root,
//! which `PgLedgerStore::migrate` applies.

/// SQL to create the balances table.
pub const CREATE_BALANCES_TABLE: &str =
    include_str!("../../../migrations/20260115100000_create_balances.sql");

/// SQL to create the events table and its indexes.
pub const CREATE_EVENTS_TABLE: &str =
    include_str!("../../../migrations/20260115100100_create_events.sql");
