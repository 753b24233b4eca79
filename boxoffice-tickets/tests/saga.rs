use boxoffice_catalog::{EventBuilder, InMemoryInventory};
use boxoffice_core::{Currency, InventoryStore, ManualClock, TicketQuery, TicketRepository, TicketStatus};
use boxoffice_shared::models::events::{TICKET_CANCELLED, TICKET_PURCHASED, TICKET_RESERVED};
use boxoffice_shared::Masked;
use boxoffice_tickets::{
    Actor, InMemoryTicketStore, MockPaymentAdapter, Notifier, RecordingPublisher, RetryPolicy, Role, SagaContext,
    SagaError, SagaPolicy, TicketService,
};
use chrono::Duration;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use uuid::Uuid;

const PRICE: i64 = 2500;

struct Harness {
    inventory: Arc<InMemoryInventory>,
    store: Arc<InMemoryTicketStore>,
    payments: Arc<MockPaymentAdapter>,
    publisher: Arc<RecordingPublisher>,
    clock: Arc<ManualClock>,
    service: Arc<TicketService>,
    event_id: Uuid,
}

impl Harness {
    fn new(capacity: i32) -> Self {
        let inventory = Arc::new(InMemoryInventory::new());
        let store = Arc::new(InMemoryTicketStore::new());
        let payments = Arc::new(MockPaymentAdapter::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let clock = Arc::new(ManualClock::default());

        let event = EventBuilder::new("Symphony No. 9")
            .capacity(capacity)
            .price(PRICE, Currency::Eur)
            .creator("organizer-1")
            .build();
        let event_id = event.id;
        inventory.initialize(event).unwrap();

        let ctx = SagaContext::new(
            inventory.clone(),
            store.clone(),
            payments.clone(),
            Notifier::new(publisher.clone(), "notifications"),
        )
        .with_clock(clock.clone());

        Self {
            inventory,
            store,
            payments,
            publisher,
            clock,
            service: Arc::new(TicketService::new(ctx, fast_policy())),
            event_id,
        }
    }

    fn available(&self) -> i32 {
        self.inventory.available(&self.event_id).unwrap()
    }

    async fn reserve(&self, user: &str, quantity: u32) -> Vec<Uuid> {
        let receipt = self.service.reserve(self.event_id, user, quantity).await.unwrap();
        receipt.tickets.iter().map(|t| t.id).collect()
    }

    async fn status(&self, id: Uuid) -> TicketStatus {
        self.store.get(id).await.unwrap().unwrap().status
    }
}

fn fast_policy() -> SagaPolicy {
    SagaPolicy {
        retry: RetryPolicy {
            min_delay: StdDuration::from_millis(1),
            max_delay: StdDuration::from_millis(5),
            max_attempts: 3,
        },
        ..SagaPolicy::default()
    }
}

fn token(value: &str) -> Masked<String> {
    Masked::new(value.to_string())
}

#[tokio::test]
async fn test_reserve_purchase_cancel_scenario() {
    let h = Harness::new(2);

    let first = h.reserve("alice", 1).await;
    assert_eq!(h.available(), 1);

    let err = h.service.reserve(h.event_id, "bob", 2).await.unwrap_err();
    assert!(matches!(err, SagaError::InsufficientCapacity { requested: 2, available: 1 }));
    assert_eq!(h.available(), 1);

    let receipt = h.service.purchase("alice", &first, token("tok_visa")).await.unwrap();
    assert_eq!(receipt.total_amount, PRICE);
    let stored = h.store.get(first[0]).await.unwrap().unwrap();
    assert_eq!(stored.status, TicketStatus::Purchased);
    assert_eq!(stored.payment_id.as_deref(), Some(receipt.payment_id.as_str()));
    assert!(stored.expires_at.is_none());

    let cancelled = h.service.cancel("alice", &first).await.unwrap();
    assert_eq!(cancelled.refunded_count, 1);
    assert!(cancelled.refund_failures.is_empty());
    assert_eq!(h.payments.refunds().len(), 1);
    assert_eq!(h.available(), 2);
    assert_eq!(h.status(first[0]).await, TicketStatus::Cancelled);
}

#[tokio::test]
async fn test_concurrent_reservations_never_oversell() {
    let h = Harness::new(10);

    let attempts = (0..20).map(|i| {
        let service = h.service.clone();
        let event_id = h.event_id;
        tokio::spawn(async move { service.reserve(event_id, &format!("user-{}", i), 3).await })
    });
    let results = futures_util::future::join_all(attempts).await;

    let mut granted = 0;
    for result in results {
        match result.unwrap() {
            Ok(_) => granted += 1,
            Err(SagaError::InsufficientCapacity { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(granted, 3);
    assert_eq!(h.available(), 1);
    assert_eq!(h.store.count_by_status(TicketStatus::Reserved), 9);
}

#[tokio::test]
async fn test_seat_bounds_hold_under_mixed_load() {
    let h = Harness::new(5);

    let tasks = (0..30).map(|i| {
        let service = h.service.clone();
        let event_id = h.event_id;
        tokio::spawn(async move {
            let user = format!("user-{}", i % 7);
            if let Ok(receipt) = service.reserve(event_id, &user, 1 + (i % 2) as u32).await {
                if i % 3 == 0 {
                    let ids: Vec<Uuid> = receipt.tickets.iter().map(|t| t.id).collect();
                    let _ = service.cancel(&user, &ids).await;
                }
            }
        })
    });
    for task in futures_util::future::join_all(tasks).await {
        task.unwrap();
    }

    let available = h.available();
    assert!((0..=5).contains(&available));
    assert_eq!(available as usize, 5 - h.store.count_by_status(TicketStatus::Reserved));
}

#[tokio::test]
async fn test_reserve_then_cancel_restores_seats() {
    let h = Harness::new(8);
    let ids = h.reserve("alice", 4).await;
    assert_eq!(h.available(), 4);

    let receipt = h.service.cancel("alice", &ids).await.unwrap();
    assert_eq!(receipt.cancelled.len(), 4);
    assert_eq!(receipt.refunded_count, 0);
    assert!(h.payments.refunds().is_empty());
    assert_eq!(h.available(), 8);
}

#[tokio::test]
async fn test_expired_hold_is_released_exactly_once() {
    let h = Harness::new(3);
    let ids = h.reserve("alice", 1).await;
    assert_eq!(h.available(), 2);

    h.clock.advance(Duration::minutes(11));

    let err = h.service.purchase("alice", &ids, token("tok_visa")).await.unwrap_err();
    assert!(matches!(err, SagaError::ReservationExpired { released: 1 }));
    assert_eq!(h.available(), 3);
    assert_eq!(h.status(ids[0]).await, TicketStatus::Cancelled);
    assert!(h.payments.charges().is_empty());

    let report = h.service.sweep_once().await.unwrap();
    assert_eq!(report.released, 0);
    assert_eq!(h.available(), 3);

    let err = h.service.purchase("alice", &ids, token("tok_visa")).await.unwrap_err();
    assert!(matches!(err, SagaError::InvalidOrExpiredTickets { requested: 1, found: 0 }));
}

#[tokio::test]
async fn test_declined_payment_leaves_holds_untouched() {
    let h = Harness::new(5);
    let ids = h.reserve("alice", 3).await;

    let err = h.service.purchase("alice", &ids, token("tok_fail_insufficient")).await.unwrap_err();
    assert!(matches!(err, SagaError::PaymentFailed(_)));

    for id in &ids {
        assert_eq!(h.status(*id).await, TicketStatus::Reserved);
    }
    assert_eq!(h.available(), 2);
}

#[tokio::test]
async fn test_one_refund_per_payment() {
    let h = Harness::new(5);
    let ids = h.reserve("alice", 2).await;
    let receipt = h.service.purchase("alice", &ids, token("tok_visa")).await.unwrap();

    let cancelled = h.service.cancel("alice", &ids).await.unwrap();
    assert_eq!(cancelled.refunded_count, 2);

    let refunds = h.payments.refunds();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].payment_id, receipt.payment_id);
    assert_eq!(refunds[0].amount, Some(2 * PRICE));
}

#[tokio::test]
async fn test_refund_failure_does_not_block_cancellation() {
    let h = Harness::new(5);
    let ids = h.reserve("alice", 2).await;
    let receipt = h.service.purchase("alice", &ids, token("tok_visa")).await.unwrap();
    h.payments.set_refunds_unavailable(true);

    let cancelled = h.service.cancel("alice", &ids).await.unwrap();
    assert_eq!(cancelled.cancelled.len(), 2);
    assert_eq!(cancelled.refunded_count, 0);
    assert_eq!(cancelled.refund_failures.len(), 1);
    assert_eq!(cancelled.refund_failures[0].payment_id, receipt.payment_id);
    assert_eq!(cancelled.refund_failures[0].amount, 2 * PRICE);
    assert_eq!(h.available(), 5);
}

#[tokio::test]
async fn test_quantity_bounds() {
    let h = Harness::new(50);
    for quantity in [0, 11] {
        let err = h.service.reserve(h.event_id, "alice", quantity).await.unwrap_err();
        assert!(matches!(err, SagaError::InvalidQuantity { max: 10, .. }));
    }
    assert_eq!(h.available(), 50);

    let err = h.service.reserve(Uuid::new_v4(), "alice", 1).await.unwrap_err();
    assert!(matches!(err, SagaError::EventNotFound(_)));
}

#[tokio::test]
async fn test_purchase_rejects_tickets_from_two_events() {
    let h = Harness::new(5);
    let other = EventBuilder::new("Matinee").capacity(5).build();
    let other_id = other.id;
    h.inventory.initialize(other).unwrap();

    let mut ids = h.reserve("alice", 1).await;
    let receipt = h.service.reserve(other_id, "alice", 1).await.unwrap();
    ids.push(receipt.tickets[0].id);

    let err = h.service.purchase("alice", &ids, token("tok_visa")).await.unwrap_err();
    assert!(matches!(err, SagaError::MultipleEvents));
    assert!(h.payments.charges().is_empty());
}

#[tokio::test]
async fn test_purchase_requires_ownership() {
    let h = Harness::new(5);
    let ids = h.reserve("alice", 1).await;

    let err = h.service.purchase("mallory", &ids, token("tok_visa")).await.unwrap_err();
    assert!(matches!(err, SagaError::InvalidOrExpiredTickets { requested: 1, found: 0 }));

    let err = h.service.purchase("alice", &[ids[0], ids[0]], token("tok_visa")).await.unwrap_err();
    assert!(matches!(err, SagaError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_cancel_is_all_or_nothing_on_unknown_ids() {
    let h = Harness::new(5);
    let mut ids = h.reserve("alice", 2).await;
    ids.push(Uuid::new_v4());

    let err = h.service.cancel("alice", &ids).await.unwrap_err();
    assert!(matches!(err, SagaError::TicketNotFound { requested: 3, found: 2 }));
    assert_eq!(h.status(ids[0]).await, TicketStatus::Reserved);
    assert_eq!(h.available(), 3);
}

#[tokio::test]
async fn test_cannot_cancel_after_event() {
    let h = Harness::new(5);
    let ids = h.reserve("alice", 1).await;
    h.service.purchase("alice", &ids, token("tok_visa")).await.unwrap();

    h.clock.advance(Duration::days(8));

    let err = h.service.cancel("alice", &ids).await.unwrap_err();
    assert!(matches!(err, SagaError::EventAlreadyOccurred(id) if id == h.event_id));
    assert_eq!(h.status(ids[0]).await, TicketStatus::Purchased);
}

#[tokio::test]
async fn test_failed_ticket_write_rolls_back_reservation() {
    let h = Harness::new(5);
    h.store.fail_inserts_after(1);

    let err = h.service.reserve(h.event_id, "alice", 3).await.unwrap_err();
    assert!(matches!(err, SagaError::Repository(_)));
    assert!(h.store.is_empty());
    assert_eq!(h.available(), 5);
}

#[tokio::test]
async fn test_sweep_releases_lapsed_holds_and_notifies_per_user() {
    let h = Harness::new(10);
    h.reserve("alice", 2).await;
    h.reserve("bob", 1).await;
    assert_eq!(h.available(), 7);

    // Past the deadline but inside the grace window.
    h.clock.advance(Duration::minutes(10) + Duration::seconds(10));
    assert_eq!(h.service.sweep_once().await.unwrap().released, 0);

    h.clock.advance(Duration::seconds(30));
    let report = h.service.sweep_once().await.unwrap();
    assert_eq!(report.examined, 3);
    assert_eq!(report.released, 3);
    assert_eq!(h.available(), 10);

    let messages = h.publisher.wait_for(TICKET_CANCELLED, 2, StdDuration::from_secs(1)).await;
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.data()["reason"] == "RESERVATION_EXPIRED"));

    assert_eq!(h.service.sweep_once().await.unwrap().released, 0);
}

#[tokio::test]
async fn test_transient_purchase_write_is_retried() {
    let h = Harness::new(5);
    let ids = h.reserve("alice", 2).await;
    h.store.fail_purchase_writes(2);

    h.service.purchase("alice", &ids, token("tok_visa")).await.unwrap();
    assert_eq!(h.status(ids[0]).await, TicketStatus::Purchased);
    assert_eq!(h.status(ids[1]).await, TicketStatus::Purchased);
}

#[tokio::test]
async fn test_unconfirmed_charge_settles_in_background() {
    let h = Harness::new(5);
    let ids = h.reserve("alice", 1).await;
    h.store.fail_purchase_writes(10);

    let err = h.service.purchase("alice", &ids, token("tok_visa")).await.unwrap_err();
    let payment_id = match err {
        SagaError::InternalInconsistency { payment_id } => payment_id,
        other => panic!("unexpected error: {other}"),
    };

    let deadline = tokio::time::Instant::now() + StdDuration::from_secs(2);
    while h.service.pending_settlements() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(StdDuration::from_millis(5)).await;
    }

    let ticket = h.store.get(ids[0]).await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Purchased);
    assert_eq!(ticket.payment_id, Some(payment_id));
    assert!(h.payments.refunds().is_empty());
}

#[tokio::test]
async fn test_seat_release_outage_is_settled_in_background() {
    let h = Harness::new(5);
    let ids = h.reserve("alice", 1).await;
    assert_eq!(h.available(), 4);
    // More failures than the inline retries absorb.
    h.inventory.fail_releases(6);

    let receipt = h.service.cancel("alice", &ids).await.unwrap();
    assert_eq!(receipt.cancelled.len(), 1);
    assert_eq!(h.status(ids[0]).await, TicketStatus::Cancelled);

    let deadline = tokio::time::Instant::now() + StdDuration::from_secs(2);
    while h.available() < 5 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(StdDuration::from_millis(5)).await;
    }
    assert_eq!(h.available(), 5);

    while h.service.pending_settlements() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(StdDuration::from_millis(5)).await;
    }
    assert_eq!(h.service.pending_settlements(), 0);
}

#[tokio::test]
async fn test_expired_hold_release_survives_inventory_outage() {
    let h = Harness::new(3);
    let ids = h.reserve("alice", 2).await;
    h.clock.advance(Duration::minutes(11));
    h.inventory.fail_releases(8);

    let report = h.service.sweep_once().await.unwrap();
    assert_eq!(report.released, 2);

    let deadline = tokio::time::Instant::now() + StdDuration::from_secs(2);
    while h.available() < 3 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(StdDuration::from_millis(5)).await;
    }
    assert_eq!(h.available(), 3);
    assert_eq!(h.status(ids[1]).await, TicketStatus::Cancelled);
}

#[tokio::test]
async fn test_transient_cancellation_write_is_retried() {
    let h = Harness::new(5);
    let ids = h.reserve("alice", 2).await;
    h.store.fail_cancellations(ids[1], 2);

    let receipt = h.service.cancel("alice", &ids).await.unwrap();
    assert_eq!(receipt.cancelled.len(), 2);
    assert_eq!(h.status(ids[1]).await, TicketStatus::Cancelled);
    assert_eq!(h.available(), 5);
}

#[tokio::test]
async fn test_cancel_reports_tickets_it_could_not_cancel() {
    let h = Harness::new(5);
    let ids = h.reserve("alice", 2).await;
    h.store.fail_cancellations(ids[1], 100);

    let err = h.service.cancel("alice", &ids).await.unwrap_err();
    match err {
        SagaError::IncompleteCancellation { cancelled, remaining } => {
            assert_eq!(cancelled, vec![ids[0]]);
            assert_eq!(remaining, vec![ids[1]]);
        }
        other => panic!("unexpected error: {other}"),
    }

    // The cancelled half gave its seat back; the other ticket is still held.
    assert_eq!(h.status(ids[0]).await, TicketStatus::Cancelled);
    assert_eq!(h.status(ids[1]).await, TicketStatus::Reserved);
    assert_eq!(h.available(), 4);
}

#[tokio::test]
async fn test_check_in_rules() {
    let h = Harness::new(5);
    let ids = h.reserve("alice", 2).await;
    h.service.purchase("alice", &ids[..1], token("tok_visa")).await.unwrap();

    let paid = h.store.get(ids[0]).await.unwrap().unwrap().ticket_number;
    let held = h.store.get(ids[1]).await.unwrap().unwrap().ticket_number;

    let creator = Actor::new("organizer-1", Role::User);
    let operator = Actor::new("door-7", Role::Operator);
    let stranger = Actor::new("mallory", Role::User);

    assert!(h.service.verify(&paid, &creator).await.is_ok());
    assert!(h.service.verify(&paid, &Actor::new("root", Role::Admin)).await.is_ok());
    assert!(matches!(h.service.verify(&paid, &operator).await, Err(SagaError::Forbidden(_))));
    assert!(matches!(h.service.check_in(&paid, &stranger).await, Err(SagaError::Forbidden(_))));
    assert!(matches!(
        h.service.check_in(&held, &operator).await,
        Err(SagaError::NotEligibleForCheckIn(TicketStatus::Reserved))
    ));

    let used = h.service.check_in(&paid, &operator).await.unwrap();
    assert_eq!(used.status, TicketStatus::Used);
    assert!(used.checked_in && used.checked_in_at.is_some());

    assert!(matches!(h.service.check_in(&paid, &operator).await, Err(SagaError::AlreadyCheckedIn)));
    assert!(matches!(h.service.verify(&paid, &creator).await, Err(SagaError::AlreadyCheckedIn)));
    assert!(matches!(
        h.service.verify("TIX-NOPE", &creator).await,
        Err(SagaError::TicketNotFound { .. })
    ));
}

#[tokio::test]
async fn test_listing_filters_and_orders() {
    let h = Harness::new(10);
    let first = h.reserve("alice", 1).await;
    h.clock.advance(Duration::seconds(5));
    let second = h.reserve("alice", 1).await;
    h.reserve("bob", 1).await;
    h.service.purchase("alice", &second, token("tok_visa")).await.unwrap();

    let all = h.service.list_for_user("alice", &TicketQuery::default()).await.unwrap();
    assert_eq!(all.iter().map(|t| t.id).collect::<Vec<_>>(), vec![second[0], first[0]]);

    let purchased = h
        .service
        .list_for_user(
            "alice",
            &TicketQuery {
                status: Some(TicketStatus::Purchased),
                event_id: Some(h.event_id),
            },
        )
        .await
        .unwrap();
    assert_eq!(purchased.len(), 1);
    assert_eq!(purchased[0].id, second[0]);
}

#[tokio::test]
async fn test_saga_steps_emit_notifications() {
    let h = Harness::new(5);
    let ids = h.reserve("alice", 2).await;
    h.service.purchase("alice", &ids, token("tok_visa")).await.unwrap();
    h.service.cancel("alice", &ids).await.unwrap();

    let reserved = h.publisher.wait_for(TICKET_RESERVED, 1, StdDuration::from_secs(1)).await;
    assert_eq!(reserved[0].key, h.event_id.to_string());
    assert_eq!(reserved[0].data()["quantity"], 2);

    let purchased = h.publisher.wait_for(TICKET_PURCHASED, 1, StdDuration::from_secs(1)).await;
    assert_eq!(purchased[0].data()["totalAmount"], 2 * PRICE);
    assert_eq!(purchased[0].data()["currency"], "EUR");

    let cancelled = h.publisher.wait_for(TICKET_CANCELLED, 1, StdDuration::from_secs(1)).await;
    assert_eq!(cancelled[0].data()["refundedCount"], 2);
    assert_eq!(cancelled[0].data()["reason"], "USER_REQUESTED");
}

#[tokio::test]
async fn test_event_lookup_is_shared_with_inventory() {
    let h = Harness::new(4);
    h.reserve("alice", 1).await;
    let event = h.inventory.get_event(h.event_id).await.unwrap().unwrap();
    assert_eq!(event.available_seats, 3);
    assert_eq!(event.sold_or_held(), 1);
}
