//! Service-level tests against the in-memory fakes.

use std::sync::Arc;
use std::time::Duration;

use ledger_core::account::{AccountId, Balance};
use ledger_core::error::LedgerError;
use ledger_core::event::Event;
use ledger_core::operation::{EventType, Operation};
use ledger_core::store::{BalanceStore, LedgerStore};
use ledger_service::{
    DEFAULT_SUBJECT, InProcessBroker, LedgerConfig, LedgerService, PipelineHandle,
    spawn_notification_pipeline,
};
use ledger_test_support::{
    FixedClock, InMemoryLedgerStore, RecordingPublisher, SequenceNotificationIds,
};
use tokio::task::JoinSet;

/// A service wired to a live notification pipeline with a recording
/// publisher.
struct Harness {
    store: InMemoryLedgerStore,
    service: Arc<LedgerService>,
    publisher: Arc<RecordingPublisher>,
    pipeline: PipelineHandle,
}

impl Harness {
    fn new() -> Self {
        let store = InMemoryLedgerStore::new();
        let clock = Arc::new(FixedClock::default());
        let publisher = Arc::new(RecordingPublisher::new());
        let (queue, pipeline) = spawn_notification_pipeline(
            Arc::new(store.clone()),
            publisher.clone(),
            clock.clone(),
            4096,
        );
        let service = LedgerService::new(
            Arc::new(store.clone()),
            clock,
            Arc::new(SequenceNotificationIds::new()),
            queue,
            LedgerConfig::default(),
        );
        Self {
            store,
            service: Arc::new(service),
            publisher,
            pipeline,
        }
    }

    /// Drops the service and waits for the pipeline to drain.
    async fn finish(self) -> (InMemoryLedgerStore, Arc<RecordingPublisher>) {
        drop(self.service);
        self.pipeline.shutdown().await;
        (self.store, self.publisher)
    }
}

fn event_types(events: &[Event]) -> Vec<EventType> {
    events.iter().map(Event::event_type).collect()
}

// --- Scenarios ---

#[tokio::test]
async fn test_open_account_starts_at_zero_and_rejects_reopen() {
    let harness = Harness::new();
    let service = &harness.service;

    service.open_account(AccountId(1)).await.unwrap();
    let balance = service.get_balance(AccountId(1)).await.unwrap();
    let reopen = service.open_account(AccountId(1)).await;

    assert_eq!(
        balance,
        Balance {
            account_id: AccountId(1),
            balance: 0,
        }
    );
    assert_eq!(reopen, Err(LedgerError::AlreadyExists(AccountId(1))));
}

#[tokio::test]
async fn test_deposit_then_withdraw_records_three_events() {
    let harness = Harness::new();
    let service = &harness.service;

    service.open_account(AccountId(1)).await.unwrap();
    service.deposit(AccountId(1), 10).await.unwrap();
    service.withdraw(AccountId(1), 3).await.unwrap();

    assert_eq!(service.get_balance(AccountId(1)).await.unwrap().balance, 7);
    let events = service.events_for_account(AccountId(1)).await.unwrap();
    assert_eq!(
        event_types(&events),
        vec![EventType::Open, EventType::Deposit, EventType::Withdraw]
    );
}

#[tokio::test]
async fn test_withdraw_from_empty_account_is_rejected_without_event() {
    let harness = Harness::new();
    let service = &harness.service;
    service.open_account(AccountId(1)).await.unwrap();

    let result = service.withdraw(AccountId(1), 3).await;

    assert_eq!(
        result,
        Err(LedgerError::NegativeBalance {
            account_id: AccountId(1),
            balance: 0,
            amount: 3,
        })
    );
    let events = service.events_for_account(AccountId(1)).await.unwrap();
    assert_eq!(event_types(&events), vec![EventType::Open]);
}

#[tokio::test]
async fn test_transfer_moves_funds_between_accounts() {
    let harness = Harness::new();
    let service = &harness.service;
    service.open_account(AccountId(1)).await.unwrap();
    service.open_account(AccountId(2)).await.unwrap();
    service.deposit(AccountId(1), 100).await.unwrap();

    let event = service
        .transfer(AccountId(1), AccountId(2), 40)
        .await
        .unwrap();

    assert_eq!(service.get_balance(AccountId(1)).await.unwrap().balance, 60);
    assert_eq!(service.get_balance(AccountId(2)).await.unwrap().balance, 40);
    assert_eq!(
        event.operation,
        Operation::Transfer {
            from: AccountId(1),
            to: AccountId(2),
            amount: 40,
        }
    );
    // The transfer shows up in both accounts' trails.
    let destination_events = service.events_for_account(AccountId(2)).await.unwrap();
    assert_eq!(
        event_types(&destination_events),
        vec![EventType::Open, EventType::Transfer]
    );
}

#[tokio::test]
async fn test_balance_of_unknown_account_is_user_not_found() {
    let harness = Harness::new();

    let result = harness.service.get_balance(AccountId(999)).await;

    assert_eq!(result, Err(LedgerError::UserNotFound(AccountId(999))));
}

#[tokio::test]
async fn test_transfer_to_missing_account_does_not_create_it() {
    let harness = Harness::new();
    let service = &harness.service;
    service.open_account(AccountId(1)).await.unwrap();
    service.deposit(AccountId(1), 10).await.unwrap();

    let result = service.transfer(AccountId(1), AccountId(2), 5).await;

    assert_eq!(result, Err(LedgerError::UserNotFound(AccountId(2))));
    assert_eq!(service.get_balance(AccountId(1)).await.unwrap().balance, 10);
    assert!(!harness.store.balances().contains_key(&AccountId(2)));
}

// --- Properties ---

#[tokio::test]
async fn test_no_balance_is_ever_negative() {
    let harness = Harness::new();
    let service = &harness.service;
    for id in 1..=3 {
        service.open_account(AccountId(id)).await.unwrap();
    }
    service.deposit(AccountId(1), 20).await.unwrap();

    // Accepted and rejected operations interleaved.
    let _ = service.withdraw(AccountId(1), 25).await;
    let _ = service.transfer(AccountId(1), AccountId(2), 15).await;
    let _ = service.transfer(AccountId(2), AccountId(3), 16).await;
    let _ = service.withdraw(AccountId(2), 15).await;
    let _ = service.transfer(AccountId(1), AccountId(3), 6).await;

    assert!(harness.store.balances().values().all(|&balance| balance >= 0));
    assert_eq!(harness.store.balances()[&AccountId(1)], 5);
}

#[tokio::test]
async fn test_transfers_conserve_the_pair_total() {
    let harness = Harness::new();
    let service = &harness.service;
    service.open_account(AccountId(1)).await.unwrap();
    service.open_account(AccountId(2)).await.unwrap();
    service.deposit(AccountId(1), 70).await.unwrap();
    service.deposit(AccountId(2), 30).await.unwrap();

    for (from, to, amount) in [(1, 2, 25), (2, 1, 50), (1, 2, 0), (2, 1, 500)] {
        let _ = service.transfer(AccountId(from), AccountId(to), amount).await;
        let a = service.get_balance(AccountId(1)).await.unwrap().balance;
        let b = service.get_balance(AccountId(2)).await.unwrap().balance;
        assert_eq!(a + b, 100);
    }
}

#[tokio::test]
async fn test_repeated_balance_reads_agree() {
    let harness = Harness::new();
    let service = &harness.service;
    service.open_account(AccountId(1)).await.unwrap();
    service.deposit(AccountId(1), 42).await.unwrap();

    let first = service.get_balance(AccountId(1)).await.unwrap();
    let second = service.get_balance(AccountId(1)).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_failed_operations_leave_state_untouched() {
    // Arrange
    let harness = Harness::new();
    let service = &harness.service;
    service.open_account(AccountId(1)).await.unwrap();
    service.open_account(AccountId(2)).await.unwrap();
    service.deposit(AccountId(1), 10).await.unwrap();
    let balances_before = harness.store.balances();
    let events_before = harness.store.events().len();

    // Act
    let failures = [
        service.open_account(AccountId(1)).await,
        service.deposit(AccountId(1), -1).await,
        service.deposit(AccountId(9), 1).await,
        service.withdraw(AccountId(2), 1).await,
        service.transfer(AccountId(1), AccountId(2), 11).await,
        service.transfer(AccountId(1), AccountId(9), 1).await,
        service.transfer(AccountId(9), AccountId(1), 1).await,
    ];

    // Assert
    assert!(failures.iter().all(Result::is_err));
    assert_eq!(harness.store.balances(), balances_before);
    assert_eq!(harness.store.events().len(), events_before);
}

#[tokio::test]
async fn test_failed_append_rolls_back_balance_change() {
    let harness = Harness::new();
    let service = &harness.service;
    service.open_account(AccountId(1)).await.unwrap();
    harness.store.fail_next_append();

    let result = service.deposit(AccountId(1), 10).await;

    assert!(matches!(result, Err(LedgerError::Storage(_))));
    assert_eq!(harness.store.balances()[&AccountId(1)], 0);
    assert_eq!(harness.store.events().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deposits_lose_no_updates() {
    const DEPOSITS: i64 = 1000;
    let harness = Harness::new();
    harness.service.open_account(AccountId(1)).await.unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..DEPOSITS {
        let service = Arc::clone(&harness.service);
        tasks.spawn(async move { service.deposit(AccountId(1), 1).await });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    let balance = harness.service.get_balance(AccountId(1)).await.unwrap();
    assert_eq!(balance.balance, DEPOSITS);
    let (store, publisher) = harness.finish().await;
    assert_eq!(store.events().len(), 1001);
    assert_eq!(publisher.published().len(), 1001);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_direction_transfers_do_not_deadlock() {
    const ROUNDS: usize = 500;
    let harness = Harness::new();
    for id in [1, 2] {
        harness.service.open_account(AccountId(id)).await.unwrap();
        harness.service.deposit(AccountId(id), 1000).await.unwrap();
    }

    let mut tasks = JoinSet::new();
    for round in 0..ROUNDS {
        let service = Arc::clone(&harness.service);
        let (from, to) = if round % 2 == 0 { (1, 2) } else { (2, 1) };
        tasks.spawn(async move { service.transfer(AccountId(from), AccountId(to), 1).await });
    }
    let all_done = async {
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }
    };
    tokio::time::timeout(Duration::from_secs(30), all_done)
        .await
        .expect("transfers deadlocked");

    let balances = harness.store.balances();
    assert_eq!(balances[&AccountId(1)], 1000);
    assert_eq!(balances[&AccountId(2)], 1000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disjoint_accounts_proceed_while_one_is_locked() {
    let harness = Harness::new();
    harness.service.open_account(AccountId(1)).await.unwrap();
    harness.service.open_account(AccountId(2)).await.unwrap();
    let mut holder = harness.store.begin().await.unwrap();
    holder.read(AccountId(1), true).await.unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(1),
        harness.service.deposit(AccountId(2), 5),
    )
    .await;

    assert!(matches!(result, Ok(Ok(_))));
    drop(holder);
}

#[tokio::test]
async fn test_events_per_account_follow_accepted_operations() {
    let harness = Harness::new();
    let service = &harness.service;
    service.open_account(AccountId(1)).await.unwrap();
    service.open_account(AccountId(2)).await.unwrap();

    let mut expected = vec![EventType::Open];
    for (operation, accepted) in [
        (Operation::Deposit { account_id: AccountId(1), amount: 5 }, true),
        (Operation::Withdraw { account_id: AccountId(1), amount: 9 }, false),
        (Operation::Transfer { from: AccountId(1), to: AccountId(2), amount: 2 }, true),
        (Operation::Transfer { from: AccountId(2), to: AccountId(1), amount: 1 }, true),
        (Operation::Deposit { account_id: AccountId(1), amount: -1 }, false),
        (Operation::Withdraw { account_id: AccountId(1), amount: 4 }, true),
    ] {
        let event_type = operation.event_type();
        assert_eq!(service.execute(operation).await.is_ok(), accepted);
        if accepted {
            expected.push(event_type);
        }
    }

    let events = service.events_for_account(AccountId(1)).await.unwrap();
    assert_eq!(event_types(&events), expected);
    assert!(events.windows(2).all(|pair| pair[0].id < pair[1].id));
    assert_eq!(service.get_balance(AccountId(1)).await.unwrap().balance, 0);
}

// --- Notification pipeline ---

#[tokio::test]
async fn test_every_committed_event_is_published_and_confirmed() {
    let harness = Harness::new();
    harness.service.open_account(AccountId(1)).await.unwrap();
    harness.service.deposit(AccountId(1), 5).await.unwrap();
    let _ = harness.service.withdraw(AccountId(1), 50).await;

    let (store, publisher) = harness.finish().await;

    let events = store.events();
    let published = publisher.published();
    assert_eq!(published.len(), 2);
    for (event, message) in events.iter().zip(&published) {
        assert_eq!(event.notification_id, message.message_id);
        assert_eq!(event.notification_confirmed_time, Some(FixedClock::default().0));
    }
}

#[tokio::test]
async fn test_in_process_broker_delivers_to_subscribers() {
    let store = InMemoryLedgerStore::new();
    let clock = Arc::new(FixedClock::default());
    let broker = Arc::new(InProcessBroker::new(DEFAULT_SUBJECT, 16));
    let mut subscriber = broker.subscribe();
    let (queue, pipeline) =
        spawn_notification_pipeline(Arc::new(store.clone()), broker, clock.clone(), 16);
    let service = LedgerService::new(
        Arc::new(store.clone()),
        clock,
        Arc::new(SequenceNotificationIds::new()),
        queue,
        LedgerConfig::default(),
    );

    let event = service.open_account(AccountId(7)).await.unwrap();
    let delivery = subscriber.recv().await.unwrap();
    drop(service);
    pipeline.shutdown().await;

    assert!(delivery.message_id.starts_with("operation.completed:"));
    assert_eq!(delivery.event, event);
    let stored = &store.events()[0];
    assert_eq!(stored.notification_id, delivery.message_id);
    assert!(stored.is_confirmed());
}

/// Runs one broker-backed pipeline over `store`, opens `account`, and shuts
/// everything down again, as one process lifetime would.
async fn open_with_fresh_broker(store: &InMemoryLedgerStore, account: i64) {
    let clock = Arc::new(FixedClock::default());
    let broker = Arc::new(InProcessBroker::new(DEFAULT_SUBJECT, 16));
    let mut subscriber = broker.subscribe();
    let (queue, pipeline) =
        spawn_notification_pipeline(Arc::new(store.clone()), broker, clock.clone(), 16);
    let service = LedgerService::new(
        Arc::new(store.clone()),
        clock,
        Arc::new(SequenceNotificationIds::new()),
        queue,
        LedgerConfig::default(),
    );

    service.open_account(AccountId(account)).await.unwrap();
    subscriber.recv().await.unwrap();
    drop(service);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_events_published_after_restart_are_confirmed() {
    let store = InMemoryLedgerStore::new();

    open_with_fresh_broker(&store, 1).await;
    open_with_fresh_broker(&store, 2).await;

    let events = store.events();
    assert_eq!(events.len(), 2);
    assert_ne!(events[0].notification_id, events[1].notification_id);
    for event in &events {
        assert!(event.notification_id.starts_with("operation.completed:"));
        assert!(event.is_confirmed(), "event {} unconfirmed", event.id);
    }
}
