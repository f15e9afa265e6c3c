//! PostgreSQL implementation of the ledger storage traits.

pub mod pg_ledger_store;
pub mod schema;

pub use pg_ledger_store::PgLedgerStore;
