//! Saga orchestrator for order fulfillment.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::{Clock, Money, OrderId, ProductId, WarehouseId};
use domain::{Carrier, Order, OrderStatus, PaymentStatus};
use inventory::InventoryEngine;
use rand::Rng;
use serde::{Deserialize, Serialize};
use store::{OrderStore, with_backoff};

use crate::compensation::{CompensationHandler, CompensationReport};
use crate::error::{Result, SagaError};
use crate::idempotency::IdempotencyService;
use crate::services::notification::NotificationService;
use crate::services::payment::{PaymentGateway, PaymentIntentStatus};
use crate::steps::{
    self, InventoryAction, STEP_ALLOCATE_SHIPPING, STEP_RESERVE_INVENTORY, STEP_VERIFY_PAYMENT,
};

/// Output of the payment verification step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOutput {
    pub payment_id: String,
    pub amount: Money,
}

/// Output of the shipping allocation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingOutput {
    pub tracking_number: String,
    pub carrier: Carrier,
    pub estimated_delivery: DateTime<Utc>,
}

/// Terminal result of one saga execution.
///
/// A failed step does not surface as an `Err`: the saga compensates and
/// reports the cancelled outcome here. `Err` is reserved for conditions
/// the caller must handle (unknown order, concurrent duplicate trigger).
#[derive(Debug)]
pub struct FulfillmentOutcome {
    pub order_id: OrderId,
    pub fulfilled: bool,
    pub failed_step: Option<&'static str>,
    pub shipping: Option<ShippingOutput>,
    pub compensation: Option<CompensationReport>,
}

/// Drives the ordered steps
/// reserve inventory → verify payment → allocate shipping → notify,
/// compensating on failure.
///
/// Every step is safe to re-invoke: it checks the order's current status
/// before acting, side effects are gated by idempotency keys, and
/// business state advances together with status in one conditional write.
#[derive(Clone)]
pub struct SagaOrchestrator {
    orders: Arc<dyn OrderStore>,
    engine: InventoryEngine,
    payment: Arc<dyn PaymentGateway>,
    notifications: Arc<dyn NotificationService>,
    idempotency: IdempotencyService,
    compensation: CompensationHandler,
    clock: Arc<dyn Clock>,
}

impl SagaOrchestrator {
    /// Creates a new orchestrator; the compensation handler is built over
    /// the same collaborators.
    pub fn new(
        orders: Arc<dyn OrderStore>,
        engine: InventoryEngine,
        payment: Arc<dyn PaymentGateway>,
        notifications: Arc<dyn NotificationService>,
        idempotency: IdempotencyService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let compensation = CompensationHandler::new(
            orders.clone(),
            engine.clone(),
            payment.clone(),
            idempotency.clone(),
            clock.clone(),
        );
        Self {
            orders,
            engine,
            payment,
            notifications,
            idempotency,
            compensation,
            clock,
        }
    }

    /// Returns the compensation handler sharing this orchestrator's
    /// collaborators (admin cancellation invokes it directly).
    pub fn compensation_handler(&self) -> &CompensationHandler {
        &self.compensation
    }

    /// Executes the fulfillment saga for an order.
    #[tracing::instrument(skip(self), fields(%order_id))]
    pub async fn execute(&self, order_id: OrderId) -> Result<FulfillmentOutcome> {
        metrics::counter!("saga_executions_total").increment(1);
        let started = std::time::Instant::now();

        let mut order = self.load_order(order_id).await?;

        if order.status == OrderStatus::ShippingAllocated {
            // The saga already ran to completion; replay its result.
            let shipping = persisted_shipping(&order)?;
            return Ok(FulfillmentOutcome {
                order_id,
                fulfilled: true,
                failed_step: None,
                shipping: Some(shipping),
                compensation: None,
            });
        }
        if order.status.is_terminal() {
            return Err(SagaError::OrderNotReady(format!(
                "order is {}",
                order.status
            )));
        }

        tracing::info!(step = STEP_RESERVE_INVENTORY, "saga step started");
        if let Err(e) = self.reserve_inventory(&mut order).await {
            return self.fail(order_id, STEP_RESERVE_INVENTORY, e, started).await;
        }

        tracing::info!(step = STEP_VERIFY_PAYMENT, "saga step started");
        if let Err(e) = self.verify_payment(&mut order).await {
            return self.fail(order_id, STEP_VERIFY_PAYMENT, e, started).await;
        }

        tracing::info!(step = STEP_ALLOCATE_SHIPPING, "saga step started");
        let shipping = match self.allocate_shipping(&mut order).await {
            Ok(shipping) => shipping,
            Err(e) => return self.fail(order_id, STEP_ALLOCATE_SHIPPING, e, started).await,
        };

        // Best-effort: a lost confirmation email never fails the saga.
        if let Err(e) = self.notifications.send_order_confirmation(&order).await {
            tracing::warn!(%order_id, error = %e, "order confirmation email failed");
        }

        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds").record(duration);
        metrics::counter!("saga_completed_total").increment(1);
        tracing::info!(
            %order_id,
            tracking = %shipping.tracking_number,
            duration,
            "order fulfilled"
        );

        Ok(FulfillmentOutcome {
            order_id,
            fulfilled: true,
            failed_step: None,
            shipping: Some(shipping),
            compensation: None,
        })
    }

    /// Step 1: reserve every item, then move PENDING → INVENTORY_RESERVED.
    async fn reserve_inventory(&self, order: &mut Order) -> Result<()> {
        match order.status {
            // Replay: the reservation (with warehouse assignments) is
            // already persisted on the order.
            OrderStatus::InventoryReserved => return Ok(()),
            OrderStatus::Pending => {}
            other => {
                return Err(SagaError::OrderNotReady(format!(
                    "cannot reserve inventory from {other}"
                )));
            }
        }

        let mut reserved: Vec<(ProductId, WarehouseId, u32)> = Vec::new();
        for idx in 0..order.items.len() {
            let product_id = order.items[idx].product_id.clone();
            let qty = order.items[idx].quantity;
            let key = steps::inventory_key(order.order_id, &product_id, InventoryAction::Reserve);

            let engine = self.engine.clone();
            let product = product_id.clone();
            let attempt: Result<WarehouseId> = self
                .idempotency
                .execute_once(&key, STEP_RESERVE_INVENTORY, move || async move {
                    Ok(engine.reserve_anywhere(&product, qty).await?)
                })
                .await;

            match attempt {
                Ok(warehouse_id) => {
                    order.items[idx].warehouse_id = Some(warehouse_id.clone());
                    reserved.push((product_id, warehouse_id, qty));
                }
                Err(err) => {
                    self.unwind_partial_reservation(order.order_id, &reserved)
                        .await;
                    return Err(err);
                }
            }
        }

        order.transition(OrderStatus::InventoryReserved, self.clock.now())?;
        let updated = order.clone();
        with_backoff("orders.put_if_status", || {
            self.orders
                .put_if_status(updated.clone(), OrderStatus::Pending)
        })
        .await?;
        Ok(())
    }

    /// Step 2: assert the payment intent succeeded for the full amount,
    /// then move INVENTORY_RESERVED → PAYMENT_CONFIRMED.
    async fn verify_payment(&self, order: &mut Order) -> Result<PaymentOutput> {
        match order.status {
            OrderStatus::PaymentConfirmed => {
                return Ok(PaymentOutput {
                    payment_id: order.payment_intent_id.clone().unwrap_or_default(),
                    amount: order.total_amount,
                });
            }
            OrderStatus::InventoryReserved => {}
            other => {
                return Err(SagaError::OrderNotReady(format!(
                    "cannot verify payment from {other}"
                )));
            }
        }

        let intent_id = order
            .payment_intent_id
            .clone()
            .ok_or_else(|| SagaError::OrderNotReady("order has no payment intent".to_string()))?;

        let key = steps::order_step_key(order.order_id, STEP_VERIFY_PAYMENT);
        let payment = self.payment.clone();
        let expected_amount = order.total_amount;
        let output: PaymentOutput = self
            .idempotency
            .execute_once(&key, STEP_VERIFY_PAYMENT, move || async move {
                let intent = payment.get_intent(&intent_id).await?;
                if intent.status != PaymentIntentStatus::Succeeded {
                    return Err(SagaError::PaymentVerificationFailed(format!(
                        "intent {} is {}",
                        intent.id,
                        intent.status.as_str()
                    )));
                }
                if intent.amount != expected_amount {
                    return Err(SagaError::PaymentVerificationFailed(format!(
                        "intent {} amount {} does not match order total {}",
                        intent.id,
                        intent.amount.cents(),
                        expected_amount.cents()
                    )));
                }
                Ok(PaymentOutput {
                    payment_id: intent.id,
                    amount: intent.amount,
                })
            })
            .await?;

        order.payment_status = Some(PaymentStatus::Succeeded);
        order.transition(OrderStatus::PaymentConfirmed, self.clock.now())?;
        let updated = order.clone();
        with_backoff("orders.put_if_status", || {
            self.orders
                .put_if_status(updated.clone(), OrderStatus::InventoryReserved)
        })
        .await?;
        Ok(output)
    }

    /// Step 3: mint tracking, pick a carrier and an ETA, then move
    /// PAYMENT_CONFIRMED → SHIPPING_ALLOCATED (terminal success).
    async fn allocate_shipping(&self, order: &mut Order) -> Result<ShippingOutput> {
        match order.status {
            OrderStatus::ShippingAllocated => return persisted_shipping(order),
            OrderStatus::PaymentConfirmed => {}
            other => {
                return Err(SagaError::OrderNotReady(format!(
                    "cannot allocate shipping from {other}"
                )));
            }
        }

        let now = self.clock.now();
        let (carrier, tracking_number, estimated_delivery) = {
            let mut rng = rand::thread_rng();
            let carrier = Carrier::ALL[rng.gen_range(0..Carrier::ALL.len())];
            let tracking_number = format!(
                "{}{}{:03}",
                carrier.tracking_prefix(),
                now.timestamp_millis(),
                rng.gen_range(0..1000)
            );
            let estimated_delivery = now + Duration::days(rng.gen_range(3..=5));
            (carrier, tracking_number, estimated_delivery)
        };

        order.carrier = Some(carrier.as_str().to_string());
        order.tracking_number = Some(tracking_number.clone());
        order.estimated_delivery = Some(estimated_delivery);
        order.transition(OrderStatus::ShippingAllocated, now)?;
        let updated = order.clone();
        with_backoff("orders.put_if_status", || {
            self.orders
                .put_if_status(updated.clone(), OrderStatus::PaymentConfirmed)
        })
        .await?;

        Ok(ShippingOutput {
            tracking_number,
            carrier,
            estimated_delivery,
        })
    }

    /// Releases reservations taken before a mid-step failure so that a
    /// PENDING order compensated by cancellation alone cannot strand
    /// stock. Uses the same release keys as compensation, so a later
    /// compensation pass skips what was already undone here.
    async fn unwind_partial_reservation(
        &self,
        order_id: OrderId,
        reserved: &[(ProductId, WarehouseId, u32)],
    ) {
        for (product_id, warehouse_id, qty) in reserved {
            let key = steps::inventory_key(order_id, product_id, InventoryAction::Release);
            let engine = self.engine.clone();
            let (product, warehouse, qty) = (product_id.clone(), warehouse_id.clone(), *qty);
            let released: Result<()> = self
                .idempotency
                .execute_once(&key, "inventory-release", move || async move {
                    Ok(engine.release_at(&product, &warehouse, qty).await?)
                })
                .await;
            if let Err(err) = released {
                tracing::error!(
                    %order_id,
                    product = %product_id,
                    warehouse = %warehouse_id,
                    error = %err,
                    "failed to release partial reservation"
                );
            }
        }
    }

    /// Compensates after a failed step and reports the cancelled outcome.
    ///
    /// A concurrent duplicate trigger is the exception: the competing
    /// execution owns the order, so this one surfaces the error without
    /// touching anything.
    async fn fail(
        &self,
        order_id: OrderId,
        step: &'static str,
        err: SagaError,
        started: std::time::Instant,
    ) -> Result<FulfillmentOutcome> {
        if matches!(err, SagaError::ConcurrentInProgress { .. }) {
            return Err(err);
        }

        tracing::warn!(%order_id, step, error = %err, "saga step failed, compensating");
        metrics::counter!("saga_compensated_total").increment(1);

        let reason = format!("{}: {}", err.kind(), err);
        let report = self.compensation.compensate(order_id, step, &reason).await?;

        metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());
        Ok(FulfillmentOutcome {
            order_id,
            fulfilled: false,
            failed_step: Some(step),
            shipping: None,
            compensation: Some(report),
        })
    }

    async fn load_order(&self, order_id: OrderId) -> Result<Order> {
        let order = with_backoff("orders.get", || self.orders.get(order_id)).await?;
        order.ok_or(SagaError::OrderNotFound(order_id))
    }
}

/// Rebuilds the shipping output from fields persisted on an allocated
/// order (whole-saga replay).
fn persisted_shipping(order: &Order) -> Result<ShippingOutput> {
    let tracking_number = order
        .tracking_number
        .clone()
        .ok_or_else(|| SagaError::OrderNotReady("allocated order has no tracking number".into()))?;
    let carrier = order
        .carrier
        .as_deref()
        .and_then(Carrier::from_name)
        .ok_or_else(|| SagaError::OrderNotReady("allocated order has no carrier".into()))?;
    let estimated_delivery = order
        .estimated_delivery
        .ok_or_else(|| SagaError::OrderNotReady("allocated order has no delivery estimate".into()))?;
    Ok(ShippingOutput {
        tracking_number,
        carrier,
        estimated_delivery,
    })
}
