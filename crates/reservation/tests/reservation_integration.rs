//! Integration tests for the reservation coordinator over the in-memory
//! ledger and keyspace.

use std::{sync::Arc, time::Duration};

use common::{GroupId, ItemId};
use keyspace::{IdempotencyCache, InMemoryKeyValueStore, KeyValueStore, LockManager, ReadCache};
use ledger::{
    InMemoryStockLedger, ItemCatalog, LedgerError, NewItem, ReservationStatus, StockLedger,
};
use reservation::{
    CoordinatorConfig, ErrorKind, ReservationCoordinator, ReservationError, ReserveRequest,
    StockLine,
};

type TestCoordinator = ReservationCoordinator<InMemoryStockLedger, InMemoryKeyValueStore>;

struct TestHarness {
    coordinator: Arc<TestCoordinator>,
    ledger: InMemoryStockLedger,
    keyspace: InMemoryKeyValueStore,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_config(CoordinatorConfig::default())
    }

    fn with_config(config: CoordinatorConfig) -> Self {
        let ledger = InMemoryStockLedger::new();
        let keyspace = InMemoryKeyValueStore::new();
        let coordinator = Arc::new(ReservationCoordinator::new(
            ledger.clone(),
            keyspace.clone(),
            config,
        ));
        Self {
            coordinator,
            ledger,
            keyspace,
        }
    }

    async fn create_item(&self, code: &str, balance: i64) -> ItemId {
        self.ledger
            .create_item(NewItem {
                code: code.to_string(),
                description: format!("{code} description"),
                balance,
            })
            .await
            .unwrap()
            .id
    }

    async fn counters(&self, item_id: ItemId) -> (i64, i64) {
        let item = self.ledger.get_item(item_id).await.unwrap();
        (item.balance, item.reserved)
    }
}

fn request(group_id: GroupId, lines: &[(ItemId, i64)]) -> ReserveRequest {
    ReserveRequest::new(
        group_id,
        lines
            .iter()
            .map(|(id, q)| StockLine::new(*id, *q).unwrap())
            .collect(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_reserve_reject_confirm_scenario() {
    let h = TestHarness::new();
    let item = h.create_item("SKU-001", 10).await;
    let first = GroupId::new();

    h.coordinator
        .reserve_items(request(first, &[(item, 6)]))
        .await
        .unwrap();
    assert_eq!(h.counters(item).await, (10, 6));

    let err = h
        .coordinator
        .reserve_items(request(GroupId::new(), &[(item, 6)]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INSUFFICIENT_STOCK");
    assert_eq!(h.counters(item).await, (10, 6));

    let confirmed = h
        .coordinator
        .confirm_reservation_group(first)
        .await
        .unwrap();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].status, ReservationStatus::Confirmed);
    assert_eq!(h.counters(item).await, (4, 0));
}

#[tokio::test]
async fn test_idempotent_replay_returns_identical_result() {
    let h = TestHarness::new();
    let a = h.create_item("SKU-A", 10).await;
    let b = h.create_item("SKU-B", 10).await;
    let group = GroupId::new();

    let first = h
        .coordinator
        .reserve_items(request(group, &[(a, 2), (b, 3)]))
        .await
        .unwrap();
    let second = h
        .coordinator
        .reserve_items(request(group, &[(a, 2), (b, 3)]))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
    assert_eq!(first.message, "2 items reserved");
    assert_eq!(h.counters(a).await, (10, 2));
    assert_eq!(h.counters(b).await, (10, 3));
    assert_eq!(h.ledger.reservation_count().await, 2);
}

#[tokio::test]
async fn test_unreadable_record_is_replaced_after_one_execution() {
    let h = TestHarness::new();
    let item = h.create_item("SKU-001", 10).await;
    let group = GroupId::new();
    let record_key = format!("idempotency:{}", group.idempotency_key());
    h.keyspace
        .set(&record_key, r#"{"legacy":true}"#, Duration::from_secs(3600))
        .await
        .unwrap();

    let first = h
        .coordinator
        .reserve_items(request(group, &[(item, 2)]))
        .await
        .unwrap();
    for _ in 0..2 {
        let replayed = h
            .coordinator
            .reserve_items(request(group, &[(item, 2)]))
            .await
            .unwrap();
        assert_eq!(replayed, first);
    }

    assert_eq!(h.counters(item).await, (10, 2));
    assert_eq!(h.ledger.reservation_count().await, 1);
    let raw = h.keyspace.get(&record_key).await.unwrap().unwrap();
    let stored: reservation::ReservationOutcome = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored, first);
}

#[tokio::test]
async fn test_partial_failure_compensates_earlier_items() {
    let h = TestHarness::new();
    let a = h.create_item("SKU-A", 10).await;
    let b = h.create_item("SKU-B", 1).await;
    let group = GroupId::new();

    let err = h
        .coordinator
        .reserve_items(request(group, &[(a, 4), (b, 5)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReservationError::Ledger(LedgerError::InsufficientStock { item_id, .. }) if item_id == b
    ));

    assert_eq!(h.counters(a).await, (10, 0));
    let reservations = h.coordinator.reservations_for_group(group).await.unwrap();
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0].status, ReservationStatus::Cancelled);

    // A failed request stores no result, so a retry runs again.
    h.ledger
        .update_item(
            b,
            ledger::ItemUpdate {
                description: None,
                balance: Some(5),
            },
        )
        .await
        .unwrap();
    let outcome = h
        .coordinator
        .reserve_items(request(group, &[(a, 4), (b, 5)]))
        .await
        .unwrap();
    assert_eq!(outcome.reservations.len(), 2);
    assert_eq!(h.counters(a).await, (10, 4));
}

#[tokio::test]
async fn test_compensation_failure_is_logged_not_returned() {
    let h = TestHarness::new();
    let a = h.create_item("SKU-A", 10).await;
    let missing = ItemId::new();
    h.ledger.set_fail_on_cancel(true).await;

    let err = h
        .coordinator
        .reserve_items(request(GroupId::new(), &[(a, 4), (missing, 1)]))
        .await
        .unwrap_err();

    // The original failure wins over the failed cancel.
    assert!(matches!(
        err,
        ReservationError::Ledger(LedgerError::ItemNotFound(id)) if id == missing
    ));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.counters(a).await, (10, 4));
}

#[tokio::test]
async fn test_busy_item_lock_is_concurrent_modification() {
    let h = TestHarness::new();
    let a = h.create_item("SKU-A", 10).await;
    let b = h.create_item("SKU-B", 10).await;

    let other_replica = LockManager::new(h.keyspace.clone());
    let token = other_replica
        .acquire(&format!("item:{b}"), Duration::from_secs(10))
        .await
        .unwrap();

    let err = h
        .coordinator
        .reserve_items(request(GroupId::new(), &[(a, 1), (b, 1)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReservationError::ConcurrentModification { item_id } if item_id == b
    ));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(h.counters(a).await, (10, 0));
    assert_eq!(h.counters(b).await, (10, 0));

    other_replica
        .release(&format!("item:{b}"), &token)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_idempotency_store_failure_does_not_fail_request() {
    let ledger = InMemoryStockLedger::new();
    let keyspace = InMemoryKeyValueStore::new();
    let broken = InMemoryKeyValueStore::new();
    broken.set_fail_writes(true).await;

    let coordinator = ReservationCoordinator::from_parts(
        ledger.clone(),
        LockManager::new(keyspace.clone()),
        IdempotencyCache::new(broken),
        ReadCache::new(keyspace),
        CoordinatorConfig::default(),
    );
    let item = ledger
        .create_item(NewItem {
            code: "SKU-A".into(),
            description: "A".into(),
            balance: 10,
        })
        .await
        .unwrap()
        .id;

    let outcome = coordinator
        .reserve_items(request(GroupId::new(), &[(item, 3)]))
        .await
        .unwrap();
    assert_eq!(outcome.reservations.len(), 1);
    assert_eq!(ledger.get_item(item).await.unwrap().reserved, 3);
}

#[tokio::test]
async fn test_confirm_rejects_expired_group() {
    let h = TestHarness::with_config(CoordinatorConfig {
        reservation_window: chrono::Duration::zero(),
        ..CoordinatorConfig::default()
    });
    let item = h.create_item("SKU-EXP", 10).await;
    let group = GroupId::new();

    h.coordinator
        .reserve_items(request(group, &[(item, 3)]))
        .await
        .unwrap();

    let err = h
        .coordinator
        .confirm_reservation_group(group)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Expired);
    assert_eq!(err.code(), "RESERVATION_EXPIRED");
    assert_eq!(h.counters(item).await, (10, 3));

    assert_eq!(
        h.coordinator.release_expired_reservations().await.unwrap(),
        1
    );
    assert_eq!(h.counters(item).await, (10, 0));
}

#[tokio::test]
async fn test_confirm_twice_is_rejected() {
    let h = TestHarness::new();
    let item = h.create_item("SKU-001", 10).await;
    let group = GroupId::new();
    h.coordinator
        .reserve_items(request(group, &[(item, 2)]))
        .await
        .unwrap();

    h.coordinator
        .confirm_reservation_group(group)
        .await
        .unwrap();
    let err = h
        .coordinator
        .confirm_reservation_group(group)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "RESERVATION_NOT_FOUND");
    assert_eq!(h.counters(item).await, (8, 0));
}

#[tokio::test]
async fn test_cancel_twice_is_idempotent() {
    let h = TestHarness::new();
    let item = h.create_item("SKU-001", 10).await;
    let group = GroupId::new();
    h.coordinator
        .reserve_items(request(group, &[(item, 5)]))
        .await
        .unwrap();

    let first = h.coordinator.cancel_reservation_group(group).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(h.counters(item).await, (10, 0));

    let second = h.coordinator.cancel_reservation_group(group).await.unwrap();
    assert!(second.is_empty());
    assert_eq!(h.counters(item).await, (10, 0));
}

#[tokio::test]
async fn test_cancel_single_reservation_leaves_the_rest() {
    let h = TestHarness::new();
    let a = h.create_item("SKU-A", 10).await;
    let b = h.create_item("SKU-B", 10).await;
    let group = GroupId::new();
    let outcome = h
        .coordinator
        .reserve_items(request(group, &[(a, 1), (b, 2)]))
        .await
        .unwrap();

    h.coordinator
        .cancel_reservation(outcome.reservations[0].id)
        .await
        .unwrap();
    assert_eq!(h.counters(a).await, (10, 0));
    assert_eq!(h.counters(b).await, (10, 2));

    let confirmed = h
        .coordinator
        .confirm_reservation_group(group)
        .await
        .unwrap();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(h.counters(b).await, (8, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_never_oversell() {
    for _ in 0..20 {
        let h = TestHarness::new();
        let item = h.create_item("SKU-HOT", 10).await;

        let spawn = |quantity: i64| {
            let coordinator = Arc::clone(&h.coordinator);
            tokio::spawn(async move {
                coordinator
                    .reserve_items(request(GroupId::new(), &[(item, quantity)]))
                    .await
            })
        };
        let (a, b) = (spawn(7), spawn(6));
        let results = [a.await.unwrap(), b.await.unwrap()];

        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one request may hold the stock");
        for failure in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(failure.kind(), ErrorKind::Conflict);
            assert!(matches!(
                failure.code(),
                "INSUFFICIENT_STOCK" | "CONCURRENT_MODIFICATION"
            ));
        }

        let (balance, reserved) = h.counters(item).await;
        assert_eq!(balance, 10);
        assert!(reserved == 7 || reserved == 6);
    }
}

#[tokio::test]
async fn test_mutations_invalidate_read_views() {
    let h = TestHarness::new();
    let item = h.create_item("SKU-001", 10).await;
    h.keyspace
        .set("items:list", "[]", Duration::from_secs(120))
        .await
        .unwrap();

    let group = GroupId::new();
    h.coordinator
        .reserve_items(request(group, &[(item, 1)]))
        .await
        .unwrap();

    assert!(!h.keyspace.exists("items:list").await.unwrap());
    let record = format!("idempotency:{}", group.idempotency_key());
    assert!(h.keyspace.exists(&record).await.unwrap());
}

#[tokio::test]
async fn test_deduct_rejects_reserved_units() {
    let h = TestHarness::new();
    let item = h.create_item("SKU-001", 10).await;
    h.coordinator
        .reserve_items(request(GroupId::new(), &[(item, 8)]))
        .await
        .unwrap();

    let err = h
        .coordinator
        .deduct_stock(&[StockLine::new(item, 3).unwrap()])
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INSUFFICIENT_STOCK");

    let updated = h
        .coordinator
        .deduct_stock(&[StockLine::new(item, 2).unwrap()])
        .await
        .unwrap();
    assert_eq!(updated[0].balance, 8);
    assert!(!h.coordinator.check_availability(item, 1).await.unwrap());
}
