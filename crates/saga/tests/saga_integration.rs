//! End-to-end scenarios for the fulfillment saga.

use std::sync::Arc;

use chrono::Duration;
use common::{Clock, CustomerId, ManualClock, Money, OrderId};
use domain::{Order, OrderItem, OrderStatus, PaymentStatus, ShippingAddress};
use inventory::InventoryEngine;
use saga::{
    CANCEL_REASON_ABANDONED, CartReaper, CompensationOp, EmailKind, IdempotencyService,
    InMemoryNotificationService, InMemoryPaymentGateway, PaymentGateway, ReaperConfig,
    SagaOrchestrator, WebhookDisposition, WebhookIngress, WebhookVerifier, sign_payload,
};
use store::{
    InMemoryIdempotencyStore, InMemoryInventoryStore, InMemoryOrderStore, InventoryLevel,
    InventoryStore, OrderStore,
};

const SECRET: &str = "whsec_integration_secret";

struct TestHarness {
    clock: ManualClock,
    orders: Arc<InMemoryOrderStore>,
    inventory: Arc<InMemoryInventoryStore>,
    gateway: InMemoryPaymentGateway,
    notifications: InMemoryNotificationService,
    engine: InventoryEngine,
    orchestrator: SagaOrchestrator,
    ingress: WebhookIngress,
    reaper: CartReaper,
}

impl TestHarness {
    fn new() -> Self {
        let clock = ManualClock::default();
        let clock_arc: Arc<dyn Clock> = Arc::new(clock.clone());

        let orders = Arc::new(InMemoryOrderStore::new());
        let inventory = Arc::new(InMemoryInventoryStore::new());
        let idempotency_store = Arc::new(InMemoryIdempotencyStore::new());
        let gateway = InMemoryPaymentGateway::new();
        let notifications = InMemoryNotificationService::new();

        let engine = InventoryEngine::new(inventory.clone(), clock_arc.clone());
        let idempotency = IdempotencyService::new(idempotency_store, clock_arc.clone());

        let orchestrator = SagaOrchestrator::new(
            orders.clone(),
            engine.clone(),
            Arc::new(gateway.clone()),
            Arc::new(notifications.clone()),
            idempotency.clone(),
            clock_arc.clone(),
        );
        let ingress = WebhookIngress::new(
            WebhookVerifier::new(Some(SECRET.to_string()), false),
            orders.clone(),
            orchestrator.clone(),
            clock_arc.clone(),
        );
        let reaper = CartReaper::new(
            orders.clone(),
            engine.clone(),
            Arc::new(notifications.clone()),
            idempotency,
            clock_arc.clone(),
            ReaperConfig {
                send_reminders: true,
                ..ReaperConfig::default()
            },
        );

        Self {
            clock,
            orders,
            inventory,
            gateway,
            notifications,
            engine,
            orchestrator,
            ingress,
            reaper,
        }
    }

    async fn seed_inventory(&self, product: &str, warehouse: &str, quantity: u32, version: u64) {
        self.inventory
            .put(InventoryLevel {
                product_id: product.into(),
                warehouse_id: warehouse.into(),
                quantity,
                reserved: 0,
                version,
                updated_at: self.clock.now(),
            })
            .await
            .unwrap();
    }

    /// Creates a PENDING order with a minted payment intent, as the
    /// order-creation collaborator would.
    async fn create_order(&self, items: &[(&str, u32, i64)]) -> Order {
        let items: Vec<OrderItem> = items
            .iter()
            .map(|(product, qty, cents)| {
                OrderItem::new(*product, format!("{product} item"), *qty, Money::from_cents(*cents))
            })
            .collect();
        let mut order = Order::new(
            CustomerId::new(),
            items,
            ShippingAddress {
                street: "4200 Fifth Ave".into(),
                city: "Pittsburgh".into(),
                state: "PA".into(),
                postal_code: "15260".into(),
                country: "US".into(),
            },
            self.clock.now(),
        )
        .unwrap();

        let intent = self
            .gateway
            .create_intent(order.total_amount, order.order_id)
            .await
            .unwrap();
        order.payment_intent_id = Some(intent.id);
        self.orders.put_new(order.clone()).await.unwrap();
        order
    }

    fn succeeded_event(&self, order: &Order, amount: i64) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": format!("evt_{}", order.order_id),
            "type": "payment_intent.succeeded",
            "data": { "object": {
                "id": order.payment_intent_id.clone().unwrap(),
                "amount": amount,
                "status": "succeeded",
                "payment_method": "card",
                "metadata": { "orderId": order.order_id.to_string() }
            }}
        }))
        .unwrap()
    }

    /// Marks the intent paid at the provider and delivers the webhook.
    async fn pay_and_deliver(&self, order: &Order) -> WebhookDisposition {
        self.gateway
            .complete_payment(order.payment_intent_id.as_deref().unwrap(), "card");
        self.deliver(&self.succeeded_event(order, order.total_amount.cents()))
            .await
    }

    async fn deliver(&self, body: &[u8]) -> WebhookDisposition {
        let signature = sign_payload(SECRET, self.clock.now().timestamp(), body);
        self.ingress.handle(body, &signature).await.unwrap()
    }

    async fn order(&self, order_id: OrderId) -> Order {
        self.orders.get(order_id).await.unwrap().unwrap()
    }

    async fn level(&self, product: &str, warehouse: &str) -> InventoryLevel {
        self.engine
            .get(&product.into(), &warehouse.into())
            .await
            .unwrap()
    }
}

fn tracking_matches(tracking: &str) -> bool {
    let (prefix, rest) = tracking.split_at(2);
    matches!(prefix, "US" | "FE" | "UP")
        && !rest.is_empty()
        && rest.chars().all(|c| c.is_ascii_digit())
}

#[tokio::test]
async fn test_happy_path_fulfills_order() {
    let h = TestHarness::new();
    h.seed_inventory("P1", "W1", 100, 5).await;

    let order = h.create_order(&[("P1", 2, 1999)]).await;
    assert_eq!(order.total_amount.cents(), 3998);

    let disposition = h.pay_and_deliver(&order).await;
    assert_eq!(disposition, WebhookDisposition::SagaTriggered);

    let fulfilled = h.order(order.order_id).await;
    assert_eq!(fulfilled.status, OrderStatus::ShippingAllocated);
    assert_eq!(fulfilled.payment_status, Some(PaymentStatus::Succeeded));
    assert_eq!(fulfilled.payment_method.as_deref(), Some("card"));
    assert!(fulfilled.fully_reserved());
    assert!(tracking_matches(fulfilled.tracking_number.as_deref().unwrap()));
    assert!(fulfilled.carrier.is_some());
    assert!(fulfilled.estimated_delivery.is_some());

    let level = h.level("P1", "W1").await;
    assert_eq!(level.reserved, 2);
    assert_eq!(level.quantity, 100);
    assert_eq!(level.version, 6);

    assert_eq!(
        h.notifications
            .sent_count(EmailKind::OrderConfirmation, order.order_id),
        1
    );
}

#[tokio::test]
async fn test_notification_failure_does_not_fail_saga() {
    let h = TestHarness::new();
    h.seed_inventory("P1", "W1", 10, 0).await;
    h.notifications.set_fail_on_send(true);

    let order = h.create_order(&[("P1", 1, 500)]).await;
    h.pay_and_deliver(&order).await;

    let fulfilled = h.order(order.order_id).await;
    assert_eq!(fulfilled.status, OrderStatus::ShippingAllocated);
    assert_eq!(h.notifications.total_sent(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_oversell_resistance() {
    let h = TestHarness::new();
    h.seed_inventory("P1", "W1", 5, 0).await;

    let mut orders = Vec::new();
    for _ in 0..10 {
        orders.push(h.create_order(&[("P1", 1, 1000)]).await);
    }

    let mut handles = Vec::new();
    for order in &orders {
        h.gateway
            .complete_payment(order.payment_intent_id.as_deref().unwrap(), "card");
        let body = h.succeeded_event(order, order.total_amount.cents());
        let signature = sign_payload(SECRET, h.clock.now().timestamp(), &body);
        let ingress = h.ingress.clone();
        handles.push(tokio::spawn(async move {
            ingress.handle(&body, &signature).await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut fulfilled = 0;
    let mut cancelled = 0;
    for order in &orders {
        let current = h.order(order.order_id).await;
        match current.status {
            OrderStatus::ShippingAllocated => fulfilled += 1,
            OrderStatus::Cancelled => {
                cancelled += 1;
                let reason = current.metadata.cancel_reason.unwrap();
                assert!(reason.contains("InsufficientInventory"), "{reason}");
            }
            other => panic!("unexpected terminal status {other}"),
        }
    }
    assert_eq!(fulfilled, 5);
    assert_eq!(cancelled, 5);

    let level = h.level("P1", "W1").await;
    assert!(level.reserved <= 5);
    assert_eq!(level.reserved, 5);
}

#[tokio::test]
async fn test_payment_amount_mismatch_compensates() {
    let h = TestHarness::new();
    h.seed_inventory("P1", "W1", 100, 0).await;

    let order = h.create_order(&[("P1", 2, 1999)]).await;
    let intent_id = order.payment_intent_id.clone().unwrap();

    // Customer "paid", but the provider-side intent amount disagrees
    // with the order total.
    h.gateway.complete_payment(&intent_id, "card");
    h.gateway.set_intent_amount(&intent_id, Money::from_cents(3000));
    h.deliver(&h.succeeded_event(&order, 3000)).await;

    let cancelled = h.order(order.order_id).await;
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.payment_status, Some(PaymentStatus::Refunded));
    assert!(
        cancelled
            .metadata
            .cancel_reason
            .unwrap()
            .contains("PaymentVerificationFailed")
    );

    // Inventory came back and the captured payment was refunded.
    let level = h.level("P1", "W1").await;
    assert_eq!(level.reserved, 0);
    assert_eq!(h.gateway.refund_count(), 1);
    assert_eq!(
        h.gateway.refund_for(&intent_id).unwrap().reason,
        "requested_by_customer"
    );
}

#[tokio::test]
async fn test_duplicate_webhook_runs_saga_once() {
    let h = TestHarness::new();
    h.seed_inventory("P1", "W1", 100, 0).await;

    let order = h.create_order(&[("P1", 2, 1999)]).await;
    h.gateway
        .complete_payment(order.payment_intent_id.as_deref().unwrap(), "card");
    let body = h.succeeded_event(&order, order.total_amount.cents());

    let first = h.deliver(&body).await;
    let second = h.deliver(&body).await;
    let third = h.deliver(&body).await;

    assert_eq!(first, WebhookDisposition::SagaTriggered);
    assert_eq!(second, WebhookDisposition::Duplicate);
    assert_eq!(third, WebhookDisposition::Duplicate);

    let fulfilled = h.order(order.order_id).await;
    assert_eq!(fulfilled.status, OrderStatus::ShippingAllocated);

    // Reserved exactly once.
    let level = h.level("P1", "W1").await;
    assert_eq!(level.reserved, 2);
    assert_eq!(level.version, 1);
    assert_eq!(
        h.notifications
            .sent_count(EmailKind::OrderConfirmation, order.order_id),
        1
    );
}

#[tokio::test]
async fn test_saga_replay_is_idempotent() {
    let h = TestHarness::new();
    h.seed_inventory("P1", "W1", 100, 0).await;

    let order = h.create_order(&[("P1", 2, 1999)]).await;
    h.pay_and_deliver(&order).await;

    let first = h.order(order.order_id).await;
    let level_before = h.level("P1", "W1").await;

    // Re-driving the saga directly must not produce new side effects.
    let outcome = h.orchestrator.execute(order.order_id).await.unwrap();
    assert!(outcome.fulfilled);
    assert_eq!(
        outcome.shipping.unwrap().tracking_number,
        first.tracking_number.clone().unwrap()
    );

    let second = h.order(order.order_id).await;
    assert_eq!(second, first);
    let level_after = h.level("P1", "W1").await;
    assert_eq!(level_after, level_before);
    assert_eq!(h.gateway.refund_count(), 0);
}

#[tokio::test]
async fn test_payment_failed_event_cancels_order() {
    let h = TestHarness::new();
    let order = h.create_order(&[("P1", 1, 1000)]).await;

    let body = serde_json::to_vec(&serde_json::json!({
        "id": "evt_fail",
        "type": "payment_intent.payment_failed",
        "data": { "object": {
            "id": order.payment_intent_id.clone().unwrap(),
            "amount": 1000,
            "status": "requires_payment_method",
            "metadata": { "orderId": order.order_id.to_string() }
        }}
    }))
    .unwrap();

    let disposition = h.deliver(&body).await;
    assert_eq!(disposition, WebhookDisposition::OrderCancelled);

    let cancelled = h.order(order.order_id).await;
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.payment_status, Some(PaymentStatus::Failed));

    // A replay of the same failure event is a no-op.
    assert_eq!(h.deliver(&body).await, WebhookDisposition::Duplicate);
}

#[tokio::test]
async fn test_unknown_event_type_is_ignored() {
    let h = TestHarness::new();
    let body = serde_json::to_vec(&serde_json::json!({
        "id": "evt_x",
        "type": "charge.dispute.created",
        "data": { "object": { "id": "pi_x", "amount": 1, "status": "n/a" } }
    }))
    .unwrap();

    assert_eq!(h.deliver(&body).await, WebhookDisposition::Ignored);
}

#[tokio::test]
async fn test_reaper_cancels_abandoned_pending_order() {
    let h = TestHarness::new();
    h.seed_inventory("P1", "W1", 10, 0).await;
    let order = h.create_order(&[("P1", 1, 1000)]).await;

    // Within the reminder window: one reminder, no cancellation.
    h.clock.advance(Duration::minutes(26));
    let summary = h.reaper.run_once().await.unwrap();
    assert_eq!(summary.reminders_sent, 1);
    assert_eq!(summary.cancelled, 0);
    assert_eq!(
        h.notifications
            .sent_count(EmailKind::AbandonedCartReminder, order.order_id),
        1
    );

    // The reminder is one-time.
    let summary = h.reaper.run_once().await.unwrap();
    assert_eq!(summary.reminders_sent, 0);

    // Past the timeout: cancelled with the machine-readable reason.
    h.clock.advance(Duration::minutes(10));
    let summary = h.reaper.run_once().await.unwrap();
    assert_eq!(summary.cancelled, 1);

    let cancelled = h.order(order.order_id).await;
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(
        cancelled.metadata.cancel_reason.as_deref(),
        Some(CANCEL_REASON_ABANDONED)
    );
}

#[tokio::test]
async fn test_reaper_releases_reserved_inventory() {
    let h = TestHarness::new();
    h.seed_inventory("P1", "W1", 10, 0).await;

    // An order caught mid-flight: inventory reserved, payment still
    // pending (e.g. the triggering worker died before verification).
    let mut order = h.create_order(&[("P1", 3, 500)]).await;
    let warehouse = h.engine.reserve_anywhere(&"P1".into(), 3).await.unwrap();
    for item in &mut order.items {
        item.warehouse_id = Some(warehouse.clone());
    }
    order.payment_status = Some(PaymentStatus::Pending);
    order
        .transition(OrderStatus::InventoryReserved, h.clock.now())
        .unwrap();
    h.orders
        .put_if_status(order.clone(), OrderStatus::Pending)
        .await
        .unwrap();
    assert_eq!(h.level("P1", "W1").await.reserved, 3);

    h.clock.advance(Duration::minutes(31));
    let summary = h.reaper.run_once().await.unwrap();
    assert_eq!(summary.cancelled, 1);
    assert_eq!(summary.release_failures, 0);

    let cancelled = h.order(order.order_id).await;
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(h.level("P1", "W1").await.reserved, 0);
}

#[tokio::test]
async fn test_reaper_leaves_fresh_and_paid_orders_alone() {
    let h = TestHarness::new();
    h.seed_inventory("P1", "W1", 10, 0).await;

    let fresh = h.create_order(&[("P1", 1, 500)]).await;
    let paid = h.create_order(&[("P1", 1, 500)]).await;
    h.pay_and_deliver(&paid).await;

    h.clock.advance(Duration::minutes(10));
    let summary = h.reaper.run_once().await.unwrap();
    assert_eq!(summary.cancelled, 0);

    assert_eq!(h.order(fresh.order_id).await.status, OrderStatus::Pending);
    assert_eq!(
        h.order(paid.order_id).await.status,
        OrderStatus::ShippingAllocated
    );
}

#[tokio::test]
async fn test_admin_cancel_after_payment_confirmed() {
    let h = TestHarness::new();
    h.seed_inventory("P1", "W1", 10, 0).await;

    // Build an order stopped at PAYMENT_CONFIRMED.
    let mut order = h.create_order(&[("P1", 2, 1999)]).await;
    let intent_id = order.payment_intent_id.clone().unwrap();
    h.gateway.complete_payment(&intent_id, "card");
    let warehouse = h.engine.reserve_anywhere(&"P1".into(), 2).await.unwrap();
    for item in &mut order.items {
        item.warehouse_id = Some(warehouse.clone());
    }
    order.payment_status = Some(PaymentStatus::Succeeded);
    order
        .transition(OrderStatus::InventoryReserved, h.clock.now())
        .unwrap();
    order
        .transition(OrderStatus::PaymentConfirmed, h.clock.now())
        .unwrap();
    h.orders
        .put_if_status(order.clone(), OrderStatus::Pending)
        .await
        .unwrap();

    let report = h
        .orchestrator
        .compensation_handler()
        .compensate(order.order_id, "admin-cancellation", "fraud")
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(
        report.operations,
        vec![
            CompensationOp::PaymentRefunded,
            CompensationOp::InventoryReleased,
            CompensationOp::OrderCancelled,
        ]
    );

    let cancelled = h.order(order.order_id).await;
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.payment_status, Some(PaymentStatus::Refunded));
    assert_eq!(cancelled.metadata.cancel_reason.as_deref(), Some("fraud"));
    assert_eq!(h.level("P1", "W1").await.reserved, 0);
    assert_eq!(h.gateway.refund_count(), 1);
}

#[tokio::test]
async fn test_compensation_on_cancelled_order_is_noop() {
    let h = TestHarness::new();
    h.seed_inventory("P1", "W1", 10, 0).await;

    let order = h.create_order(&[("P1", 1, 500)]).await;
    let handler = h.orchestrator.compensation_handler();

    let first = handler
        .compensate(order.order_id, "admin-cancellation", "fraud")
        .await
        .unwrap();
    assert!(first.success);
    assert_eq!(first.operations, vec![CompensationOp::OrderCancelled]);

    let second = handler
        .compensate(order.order_id, "admin-cancellation", "fraud")
        .await
        .unwrap();
    assert!(second.success);
    assert!(second.operations.is_empty());
}

#[tokio::test]
async fn test_refund_failure_still_releases_and_cancels() {
    let h = TestHarness::new();
    h.seed_inventory("P1", "W1", 10, 0).await;

    let mut order = h.create_order(&[("P1", 2, 1000)]).await;
    let warehouse = h.engine.reserve_anywhere(&"P1".into(), 2).await.unwrap();
    for item in &mut order.items {
        item.warehouse_id = Some(warehouse.clone());
    }
    order.payment_status = Some(PaymentStatus::Succeeded);
    order
        .transition(OrderStatus::InventoryReserved, h.clock.now())
        .unwrap();
    order
        .transition(OrderStatus::PaymentConfirmed, h.clock.now())
        .unwrap();
    h.orders
        .put_if_status(order.clone(), OrderStatus::Pending)
        .await
        .unwrap();

    h.gateway.set_fail_on_refund(true);
    let report = h
        .orchestrator
        .compensation_handler()
        .compensate(order.order_id, "admin-cancellation", "fraud")
        .await
        .unwrap();

    // Degraded result: stock must not leak even when the refund fails.
    assert!(!report.success);
    assert_eq!(
        report.operations,
        vec![
            CompensationOp::InventoryReleased,
            CompensationOp::OrderCancelled,
        ]
    );

    let cancelled = h.order(order.order_id).await;
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    // No successful refund, so payment_status stays as captured.
    assert_eq!(cancelled.payment_status, Some(PaymentStatus::Succeeded));
    assert_eq!(h.level("P1", "W1").await.reserved, 0);
}
