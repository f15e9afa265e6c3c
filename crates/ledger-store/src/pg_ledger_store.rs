//! `PostgreSQL` implementation of the ledger store traits.
//!
//! Every `LedgerTransaction` wraps one `sqlx::Transaction`. Row locks are
//! taken with `SELECT ... FOR UPDATE` and held until commit or rollback;
//! dropping the transaction rolls it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::MigrateError;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, instrument};

use ledger_core::account::{AccountId, Balance};
use ledger_core::error::LedgerError;
use ledger_core::event::{Event, NewEvent};
use ledger_core::operation::{EventType, Operation};
use ledger_core::store::{BalanceStore, EventLog, LedgerStore, LedgerTransaction};

const SELECT_BALANCE: &str = "SELECT id, balance FROM balances WHERE id = $1";
const SELECT_BALANCE_FOR_UPDATE: &str =
    "SELECT id, balance FROM balances WHERE id = $1 FOR UPDATE";
const INSERT_BALANCE: &str = "INSERT INTO balances (id, balance) VALUES ($1, 0)";
const UPDATE_BALANCE: &str = "UPDATE balances SET balance = $2 WHERE id = $1";

const EVENT_COLUMNS: &str =
    "id, type, from_user_id, to_user_id, amount, created_time, queue_id, queue_sent_time";

/// PostgreSQL-backed ledger store.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Creates a new `PgLedgerStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies pending migrations from the workspace `migrations/` directory.
    ///
    /// # Errors
    ///
    /// Returns the migrator's error if a migration fails or the recorded
    /// history diverges from the files.
    pub async fn migrate(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, LedgerError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(storage("beginning transaction"))?;
        Ok(Box::new(PgLedgerTransaction { tx }))
    }

    async fn get_balance(&self, account_id: AccountId) -> Result<Balance, LedgerError> {
        let row: Option<BalanceRow> = sqlx::query_as(SELECT_BALANCE)
            .bind(account_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("reading balance"))?;
        row.map(Balance::from)
            .ok_or(LedgerError::UserNotFound(account_id))
    }

    async fn list_by_account(&self, account_id: AccountId) -> Result<Vec<Event>, LedgerError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE from_user_id = $1 OR to_user_id = $1 ORDER BY id"
        );
        let rows: Vec<EventRow> = sqlx::query_as(&sql)
            .bind(account_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(storage("listing events"))?;
        rows.into_iter().map(Event::try_from).collect()
    }

    async fn list_unconfirmed(&self, limit: i64) -> Result<Vec<Event>, LedgerError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE queue_sent_time IS NULL ORDER BY id LIMIT $1"
        );
        let rows: Vec<EventRow> = sqlx::query_as(&sql)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(storage("listing unconfirmed events"))?;
        rows.into_iter().map(Event::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn stamp_confirmed(
        &self,
        notification_id: &str,
        confirmed_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "UPDATE events SET queue_sent_time = COALESCE(queue_sent_time, $2) \
             WHERE queue_id = $1",
        )
        .bind(notification_id)
        .bind(confirmed_at)
        .execute(&self.pool)
        .await
        .map_err(storage("confirming notification"))?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::UnknownNotification(notification_id.to_owned()));
        }
        debug!("notification confirmed");
        Ok(())
    }
}

/// One ledger transaction on a pooled connection.
struct PgLedgerTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BalanceStore for PgLedgerTransaction {
    async fn read(&mut self, account_id: AccountId, lock: bool) -> Result<Balance, LedgerError> {
        let sql = if lock {
            SELECT_BALANCE_FOR_UPDATE
        } else {
            SELECT_BALANCE
        };
        let row: Option<BalanceRow> = sqlx::query_as(sql)
            .bind(account_id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage("reading balance"))?;
        row.map(Balance::from)
            .ok_or(LedgerError::UserNotFound(account_id))
    }

    async fn create(&mut self, account_id: AccountId) -> Result<Balance, LedgerError> {
        match sqlx::query(INSERT_BALANCE)
            .bind(account_id.0)
            .execute(&mut *self.tx)
            .await
        {
            Ok(_) => Ok(Balance::opened(account_id)),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(LedgerError::AlreadyExists(account_id))
            }
            Err(err) => Err(storage("creating balance")(err)),
        }
    }

    async fn write(&mut self, account_id: AccountId, new_balance: i64) -> Result<(), LedgerError> {
        let result = sqlx::query(UPDATE_BALANCE)
            .bind(account_id.0)
            .bind(new_balance)
            .execute(&mut *self.tx)
            .await
            .map_err(storage("writing balance"))?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::UserNotFound(account_id));
        }
        Ok(())
    }
}

#[async_trait]
impl EventLog for PgLedgerTransaction {
    async fn append(&mut self, event: NewEvent) -> Result<Event, LedgerError> {
        let sql = format!(
            "INSERT INTO events \
             (type, from_user_id, to_user_id, amount, created_time, queue_id) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {EVENT_COLUMNS}"
        );
        let operation = &event.operation;
        let row: EventRow = sqlx::query_as(&sql)
            .bind(operation.event_type().as_str())
            .bind(operation.from_account_id().0)
            .bind(operation.to_account_id().map(|id| id.0))
            .bind(operation.amount())
            .bind(event.created_time)
            .bind(&event.notification_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(storage("appending event"))?;
        Event::try_from(row)
    }

    async fn stamp_notification_id(
        &mut self,
        event: &Event,
        notification_id: &str,
    ) -> Result<(), LedgerError> {
        sqlx::query("UPDATE events SET queue_id = $2 WHERE id = $1")
            .bind(event.id)
            .bind(notification_id)
            .execute(&mut *self.tx)
            .await
            .map_err(storage("stamping notification id"))?;
        Ok(())
    }
}

#[async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        self.tx
            .commit()
            .await
            .map_err(storage("committing transaction"))
    }

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        self.tx
            .rollback()
            .await
            .map_err(storage("rolling back transaction"))
    }
}

#[derive(Debug, FromRow)]
struct BalanceRow {
    id: i64,
    balance: i64,
}

impl From<BalanceRow> for Balance {
    fn from(row: BalanceRow) -> Self {
        Self {
            account_id: AccountId(row.id),
            balance: row.balance,
        }
    }
}

#[derive(Debug, FromRow)]
struct EventRow {
    id: i64,
    #[sqlx(rename = "type")]
    event_type: String,
    from_user_id: i64,
    to_user_id: Option<i64>,
    amount: Option<i64>,
    created_time: DateTime<Utc>,
    queue_id: String,
    queue_sent_time: Option<DateTime<Utc>>,
}

impl TryFrom<EventRow> for Event {
    type Error = LedgerError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let event_type: EventType = row
            .event_type
            .parse()
            .map_err(|_| LedgerError::InvalidEvent(format!("unknown event type {}", row.event_type)))?;
        let operation = Operation::from_columns(
            event_type,
            AccountId(row.from_user_id),
            row.to_user_id.map(AccountId),
            row.amount,
        )?;
        Ok(Self {
            id: row.id,
            operation,
            created_time: row.created_time,
            notification_id: row.queue_id,
            notification_confirmed_time: row.queue_sent_time,
        })
    }
}

/// Wraps a `sqlx::Error` as a storage error with `context`.
fn storage(context: &'static str) -> impl FnOnce(sqlx::Error) -> LedgerError {
    move |err| LedgerError::Storage(format!("{context}: {err}"))
}
