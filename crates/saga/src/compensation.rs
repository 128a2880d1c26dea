//! Compensation: backing out completed saga steps.

use std::sync::Arc;

use common::{Clock, OrderId};
use domain::{Order, OrderStatus, PaymentStatus};
use inventory::InventoryEngine;
use serde::{Deserialize, Serialize};
use store::{OrderStore, StoreError, with_backoff};

use crate::error::{Result, SagaError};
use crate::idempotency::IdempotencyService;
use crate::services::payment::{PaymentGateway, REFUND_REASON_REQUESTED_BY_CUSTOMER};
use crate::steps::{self, InventoryAction};

/// A reverse operation the handler performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationOp {
    PaymentRefunded,
    InventoryReleased,
    OrderCancelled,
}

/// What compensation managed to undo.
///
/// Compensation never raises to its caller: partial failures are logged
/// and reported here as `success: false` with whatever operations did
/// land.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationReport {
    pub order_id: OrderId,
    pub success: bool,
    pub operations: Vec<CompensationOp>,
    /// Diagnostic only; behavior is driven by the observed order status.
    pub failed_step: String,
}

/// Reverses completed saga steps for an order, driven by the order's
/// observed status rather than the reported failed step.
///
/// Ordering: refund before inventory release, so a crash mid-compensation
/// leaves inventory reserved and the pass replayable. Stock must not
/// leak: refund failures are logged and the remaining actions still run,
/// and the final CANCELLED transition is always attempted.
#[derive(Clone)]
pub struct CompensationHandler {
    orders: Arc<dyn OrderStore>,
    engine: InventoryEngine,
    payment: Arc<dyn PaymentGateway>,
    idempotency: IdempotencyService,
    clock: Arc<dyn Clock>,
}

impl CompensationHandler {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        engine: InventoryEngine,
        payment: Arc<dyn PaymentGateway>,
        idempotency: IdempotencyService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            orders,
            engine,
            payment,
            idempotency,
            clock,
        }
    }

    /// Runs compensation for an order. `failed_step` and `reason` are
    /// recorded for diagnostics and as the cancel reason; the actions
    /// taken depend solely on the order's current status.
    #[tracing::instrument(skip(self, reason), fields(%order_id))]
    pub async fn compensate(
        &self,
        order_id: OrderId,
        failed_step: &str,
        reason: &str,
    ) -> Result<CompensationReport> {
        metrics::counter!("compensations_total").increment(1);

        let order = with_backoff("orders.get", || self.orders.get(order_id))
            .await?
            .ok_or(SagaError::OrderNotFound(order_id))?;
        let observed = order.status;

        let mut report = CompensationReport {
            order_id,
            success: true,
            operations: Vec::new(),
            failed_step: failed_step.to_string(),
        };

        if observed == OrderStatus::Cancelled {
            // Already compensated; nothing to undo.
            return Ok(report);
        }

        // Refund whenever the customer's money was captured: either the
        // saga confirmed payment, or the webhook already recorded a
        // succeeded intent on an order that failed earlier in the flow.
        let payment_captured = matches!(
            observed,
            OrderStatus::PaymentConfirmed | OrderStatus::ShippingAllocated
        ) || order.payment_status == Some(PaymentStatus::Succeeded);
        let refunded = if payment_captured {
            self.refund(&order, &mut report).await
        } else {
            false
        };

        if matches!(
            observed,
            OrderStatus::InventoryReserved
                | OrderStatus::PaymentConfirmed
                | OrderStatus::ShippingAllocated
        ) {
            self.release_inventory(&order, &mut report).await;
        }

        self.cancel(order, observed, refunded, reason, &mut report)
            .await;

        tracing::info!(
            %order_id,
            success = report.success,
            operations = ?report.operations,
            "compensation finished"
        );
        Ok(report)
    }

    /// Refunds the order's payment intent, gated by the
    /// `payment:{orderId}:{paymentIntentId}` key so a replayed
    /// compensation pass cannot refund twice. Failure is logged, not
    /// fatal: releasing inventory and cancelling take precedence.
    async fn refund(&self, order: &Order, report: &mut CompensationReport) -> bool {
        let Some(intent_id) = order.payment_intent_id.clone() else {
            tracing::error!(order_id = %order.order_id, "captured payment has no intent to refund");
            report.success = false;
            return false;
        };

        let key = steps::payment_key(order.order_id, &intent_id);
        let payment = self.payment.clone();
        let refunded = self
            .idempotency
            .execute_once(&key, "payment-refund", move || async move {
                payment
                    .refund(&intent_id, REFUND_REASON_REQUESTED_BY_CUSTOMER)
                    .await
            })
            .await;

        match refunded {
            Ok(refund) => {
                tracing::info!(order_id = %order.order_id, refund_id = %refund.id, "payment refunded");
                report.operations.push(CompensationOp::PaymentRefunded);
                true
            }
            Err(err) => {
                tracing::error!(order_id = %order.order_id, error = %err, "refund failed");
                report.success = false;
                false
            }
        }
    }

    /// Releases each reserved item at its warehouse. Per-item failures
    /// are logged and skipped. Each release is gated by the item's
    /// `inventory:{orderId}:{productId}:release` key so replays (and
    /// releases already performed by a partial-reservation unwind or the
    /// reaper) do not double-release.
    async fn release_inventory(&self, order: &Order, report: &mut CompensationReport) {
        let mut released_any = false;
        for item in &order.items {
            let Some(warehouse_id) = item.warehouse_id.clone() else {
                continue;
            };
            let key =
                steps::inventory_key(order.order_id, &item.product_id, InventoryAction::Release);
            let engine = self.engine.clone();
            let product = item.product_id.clone();
            let qty = item.quantity;
            let warehouse = warehouse_id.clone();

            let released: Result<()> = self
                .idempotency
                .execute_once(&key, "inventory-release", move || async move {
                    Ok(engine.release_at(&product, &warehouse, qty).await?)
                })
                .await;

            match released {
                Ok(()) => released_any = true,
                Err(err) => {
                    tracing::error!(
                        order_id = %order.order_id,
                        product = %item.product_id,
                        warehouse = %warehouse_id,
                        error = %err,
                        "inventory release failed, continuing"
                    );
                    report.success = false;
                }
            }
        }
        if released_any {
            report.operations.push(CompensationOp::InventoryReleased);
        }
    }

    /// Final transition to CANCELLED, attempted unconditionally. A lost
    /// status race is retried against the fresh status; finding the order
    /// already cancelled counts as done.
    async fn cancel(
        &self,
        mut order: Order,
        mut observed: OrderStatus,
        refunded: bool,
        reason: &str,
        report: &mut CompensationReport,
    ) {
        for _ in 0..3 {
            if refunded {
                order.payment_status = Some(PaymentStatus::Refunded);
            }
            order.metadata.cancel_reason = Some(reason.to_string());
            if let Err(err) = order.transition(OrderStatus::Cancelled, self.clock.now()) {
                tracing::error!(order_id = %order.order_id, error = %err, "cannot cancel order");
                report.success = false;
                return;
            }

            match self.orders.put_if_status(order.clone(), observed).await {
                Ok(()) => {
                    report.operations.push(CompensationOp::OrderCancelled);
                    return;
                }
                Err(StoreError::ConditionFailed { .. }) => {
                    match self.orders.get(order.order_id).await {
                        Ok(Some(fresh)) if fresh.status == OrderStatus::Cancelled => {
                            report.operations.push(CompensationOp::OrderCancelled);
                            return;
                        }
                        Ok(Some(fresh)) => {
                            observed = fresh.status;
                            order = fresh;
                        }
                        _ => break,
                    }
                }
                Err(err) => {
                    tracing::error!(order_id = %order.order_id, error = %err, "cancel write failed");
                    break;
                }
            }
        }
        report.success = false;
    }
}
