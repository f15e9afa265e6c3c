//! In-memory ledger stores.
//!
//! `InMemoryLedgerStore` behaves like the PostgreSQL store where it matters
//! for the ledger's guarantees: `read(.., true)` takes an exclusive per-row
//! lock held until the transaction ends, writes stay private to the
//! transaction until `commit`, commit re-checks the unique and
//! non-negative constraints, and dropping a transaction rolls it back.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_core::account::{AccountId, Balance};
use ledger_core::error::LedgerError;
use ledger_core::event::{Event, NewEvent};
use ledger_core::store::{BalanceStore, EventLog, LedgerStore, LedgerTransaction};
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

#[derive(Debug, Default)]
struct Tables {
    balances: BTreeMap<AccountId, i64>,
    events: BTreeMap<i64, Event>,
}

impl Tables {
    fn notification_id_taken(&self, notification_id: &str, except: Option<i64>) -> bool {
        self.events
            .values()
            .any(|e| e.notification_id == notification_id && Some(e.id) != except)
    }
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<AccountId, Arc<RowLock<()>>>>,
    next_event_id: AtomicI64,
    fail_next_append: AtomicBool,
}

impl Shared {
    fn tables(&self) -> Result<MutexGuard<'_, Tables>, LedgerError> {
        self.tables
            .lock()
            .map_err(|_| LedgerError::Storage("in-memory tables poisoned".into()))
    }

    fn row_lock(&self, account_id: AccountId) -> Result<Arc<RowLock<()>>, LedgerError> {
        let mut locks = self
            .row_locks
            .lock()
            .map_err(|_| LedgerError::Storage("in-memory row locks poisoned".into()))?;
        Ok(Arc::clone(locks.entry(account_id).or_default()))
    }
}

/// Transactional in-memory `LedgerStore`. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    shared: Arc<Shared>,
}

impl InMemoryLedgerStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a committed balance row, bypassing transactions.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn seed_balance(&self, account_id: AccountId, balance: i64) {
        self.shared
            .tables
            .lock()
            .unwrap()
            .balances
            .insert(account_id, balance);
    }

    /// Returns a snapshot of all committed balances.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn balances(&self) -> BTreeMap<AccountId, i64> {
        self.shared.tables.lock().unwrap().balances.clone()
    }

    /// Returns a snapshot of all committed events, ordered by id.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn events(&self) -> Vec<Event> {
        self.shared
            .tables
            .lock()
            .unwrap()
            .events
            .values()
            .cloned()
            .collect()
    }

    /// Makes the next `EventLog::append` fail with a storage error.
    pub fn fail_next_append(&self) {
        self.shared.fail_next_append.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, LedgerError> {
        Ok(Box::new(InMemoryTransaction::new(Arc::clone(&self.shared))))
    }

    async fn get_balance(&self, account_id: AccountId) -> Result<Balance, LedgerError> {
        let tables = self.shared.tables()?;
        tables
            .balances
            .get(&account_id)
            .map(|&balance| Balance {
                account_id,
                balance,
            })
            .ok_or(LedgerError::UserNotFound(account_id))
    }

    async fn list_by_account(&self, account_id: AccountId) -> Result<Vec<Event>, LedgerError> {
        let tables = self.shared.tables()?;
        Ok(tables
            .events
            .values()
            .filter(|e| e.operation.involves(account_id))
            .cloned()
            .collect())
    }

    async fn list_unconfirmed(&self, limit: i64) -> Result<Vec<Event>, LedgerError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let tables = self.shared.tables()?;
        Ok(tables
            .events
            .values()
            .filter(|e| !e.is_confirmed())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn stamp_confirmed(
        &self,
        notification_id: &str,
        confirmed_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let mut tables = self.shared.tables()?;
        let event = tables
            .events
            .values_mut()
            .find(|e| e.notification_id == notification_id)
            .ok_or_else(|| LedgerError::UnknownNotification(notification_id.to_owned()))?;
        event.notification_confirmed_time.get_or_insert(confirmed_at);
        Ok(())
    }
}

/// Transaction over `InMemoryLedgerStore`.
#[derive(Debug)]
struct InMemoryTransaction {
    shared: Arc<Shared>,
    locks: HashMap<AccountId, OwnedMutexGuard<()>>,
    created: BTreeSet<AccountId>,
    writes: BTreeMap<AccountId, i64>,
    appended: Vec<Event>,
    stamps: Vec<(i64, String)>,
}

impl InMemoryTransaction {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            locks: HashMap::new(),
            created: BTreeSet::new(),
            writes: BTreeMap::new(),
            appended: Vec::new(),
            stamps: Vec::new(),
        }
    }

    async fn lock_row(&mut self, account_id: AccountId) -> Result<(), LedgerError> {
        if !self.locks.contains_key(&account_id) {
            let row = self.shared.row_lock(account_id)?;
            let guard = row.lock_owned().await;
            self.locks.insert(account_id, guard);
        }
        Ok(())
    }

    /// The balance as this transaction sees it.
    fn visible_balance(&self, account_id: AccountId) -> Result<Option<i64>, LedgerError> {
        if let Some(&balance) = self.writes.get(&account_id) {
            return Ok(Some(balance));
        }
        Ok(self.shared.tables()?.balances.get(&account_id).copied())
    }

    fn ensure_exists(&self, account_id: AccountId) -> Result<(), LedgerError> {
        match self.visible_balance(account_id)? {
            Some(_) => Ok(()),
            None => Err(LedgerError::Storage(format!(
                "insert on table \"events\" violates foreign key constraint: account {account_id} does not exist"
            ))),
        }
    }

    fn notification_id_taken(
        &self,
        notification_id: &str,
        except: Option<i64>,
    ) -> Result<bool, LedgerError> {
        let pending = self
            .appended
            .iter()
            .any(|e| e.notification_id == notification_id && Some(e.id) != except)
            || self
                .stamps
                .iter()
                .any(|(id, n)| n == notification_id && Some(*id) != except);
        Ok(pending || self.shared.tables()?.notification_id_taken(notification_id, except))
    }
}

fn duplicate_notification_id(notification_id: &str) -> LedgerError {
    LedgerError::Storage(format!(
        "duplicate key value violates unique constraint \"events_queue_id_key\": {notification_id}"
    ))
}

#[async_trait]
impl BalanceStore for InMemoryTransaction {
    async fn read(&mut self, account_id: AccountId, lock: bool) -> Result<Balance, LedgerError> {
        if lock {
            self.lock_row(account_id).await?;
        }
        self.visible_balance(account_id)?
            .map(|balance| Balance {
                account_id,
                balance,
            })
            .ok_or(LedgerError::UserNotFound(account_id))
    }

    async fn create(&mut self, account_id: AccountId) -> Result<Balance, LedgerError> {
        self.lock_row(account_id).await?;
        if self.visible_balance(account_id)?.is_some() {
            return Err(LedgerError::AlreadyExists(account_id));
        }
        self.created.insert(account_id);
        self.writes.insert(account_id, 0);
        Ok(Balance::opened(account_id))
    }

    async fn write(&mut self, account_id: AccountId, new_balance: i64) -> Result<(), LedgerError> {
        if self.visible_balance(account_id)?.is_none() {
            return Err(LedgerError::UserNotFound(account_id));
        }
        if new_balance < 0 {
            return Err(LedgerError::Storage(format!(
                "new row for relation \"balances\" violates check constraint \"balances_balance_check\": {new_balance}"
            )));
        }
        self.writes.insert(account_id, new_balance);
        Ok(())
    }
}

#[async_trait]
impl EventLog for InMemoryTransaction {
    async fn append(&mut self, event: NewEvent) -> Result<Event, LedgerError> {
        if self.shared.fail_next_append.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::Storage("injected append failure".into()));
        }
        self.ensure_exists(event.operation.from_account_id())?;
        if let Some(to) = event.operation.to_account_id() {
            self.ensure_exists(to)?;
        }
        if self.notification_id_taken(&event.notification_id, None)? {
            return Err(duplicate_notification_id(&event.notification_id));
        }

        let id = self.shared.next_event_id.fetch_add(1, Ordering::SeqCst) + 1;
        let stored = Event::stored(id, event);
        self.appended.push(stored.clone());
        Ok(stored)
    }

    async fn stamp_notification_id(
        &mut self,
        event: &Event,
        notification_id: &str,
    ) -> Result<(), LedgerError> {
        if self.notification_id_taken(notification_id, Some(event.id))? {
            return Err(duplicate_notification_id(notification_id));
        }
        self.stamps.push((event.id, notification_id.to_owned()));
        Ok(())
    }
}

#[async_trait]
impl LedgerTransaction for InMemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        let mut tables = self.shared.tables()?;

        if let Some(&taken) = self
            .created
            .iter()
            .find(|id| tables.balances.contains_key(id))
        {
            return Err(LedgerError::AlreadyExists(taken));
        }
        if let Some(event) = self
            .appended
            .iter()
            .find(|e| tables.notification_id_taken(&e.notification_id, None))
        {
            return Err(duplicate_notification_id(&event.notification_id));
        }
        for (event_id, _) in &self.stamps {
            let known = tables.events.contains_key(event_id)
                || self.appended.iter().any(|e| e.id == *event_id);
            if !known {
                return Err(LedgerError::Storage(format!("event {event_id} does not exist")));
            }
        }

        tables.balances.extend(self.writes.iter().map(|(&id, &b)| (id, b)));
        for event in &self.appended {
            tables.events.insert(event.id, event.clone());
        }
        for (event_id, notification_id) in &self.stamps {
            if let Some(event) = tables.events.get_mut(event_id) {
                event.notification_id.clone_from(notification_id);
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// A store whose every operation fails with an infrastructure error. Useful
/// for testing error-handling paths.
#[derive(Debug)]
pub struct FailingLedgerStore;

fn connection_refused() -> LedgerError {
    LedgerError::Storage("connection refused".into())
}

#[async_trait]
impl LedgerStore for FailingLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, LedgerError> {
        Err(connection_refused())
    }

    async fn get_balance(&self, _account_id: AccountId) -> Result<Balance, LedgerError> {
        Err(connection_refused())
    }

    async fn list_by_account(&self, _account_id: AccountId) -> Result<Vec<Event>, LedgerError> {
        Err(connection_refused())
    }

    async fn list_unconfirmed(&self, _limit: i64) -> Result<Vec<Event>, LedgerError> {
        Err(connection_refused())
    }

    async fn stamp_confirmed(
        &self,
        _notification_id: &str,
        _confirmed_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        Err(connection_refused())
    }
}
