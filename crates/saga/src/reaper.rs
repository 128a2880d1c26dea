//! Abandoned-cart reaper.
//!
//! Periodic sweep over orders whose payment never arrived: releases the
//! stock they hold, cancels them with a machine-readable reason, and
//! (optionally) sends a one-time reminder email shortly before the
//! cutoff.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use common::Clock;
use domain::{Order, OrderStatus, PaymentStatus};
use inventory::InventoryEngine;
use store::{OrderStore, StoreError};

use crate::error::Result;
use crate::idempotency::IdempotencyService;
use crate::services::notification::NotificationService;
use crate::steps::{self, InventoryAction};

/// Cancel reason stamped on reaped orders.
pub const CANCEL_REASON_ABANDONED: &str = "ABANDONED_CART";

/// Reaper tuning.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Orders older than this without a completed payment are cancelled.
    pub timeout: Duration,

    /// Reminder emails go out once the order is older than
    /// `timeout - reminder_lead`.
    pub reminder_lead: Duration,

    /// Feature flag for reminder emails.
    pub send_reminders: bool,

    /// Base URL for the cart-resume link in reminder emails.
    pub frontend_url: String,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::minutes(30),
            reminder_lead: Duration::minutes(5),
            send_reminders: false,
            frontend_url: "http://localhost:5173".to_string(),
        }
    }
}

/// Counters from one reaper pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReaperSummary {
    pub examined: usize,
    pub cancelled: usize,
    pub reminders_sent: usize,
    pub release_failures: usize,
}

/// Scheduled compensation for orders that never paid.
#[derive(Clone)]
pub struct CartReaper {
    orders: Arc<dyn OrderStore>,
    engine: InventoryEngine,
    notifications: Arc<dyn NotificationService>,
    idempotency: IdempotencyService,
    clock: Arc<dyn Clock>,
    config: ReaperConfig,
}

impl CartReaper {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        engine: InventoryEngine,
        notifications: Arc<dyn NotificationService>,
        idempotency: IdempotencyService,
        clock: Arc<dyn Clock>,
        config: ReaperConfig,
    ) -> Self {
        Self {
            orders,
            engine,
            notifications,
            idempotency,
            clock,
            config,
        }
    }

    /// Runs one sweep. Failures on individual orders are logged and do
    /// not stop the pass; an order whose cancellation loses a race is
    /// retried on the next tick.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<ReaperSummary> {
        let mut summary = ReaperSummary::default();

        // A racing webhook can move an order to INVENTORY_RESERVED while
        // payment is still pending, so both statuses are swept.
        for status in [OrderStatus::InventoryReserved, OrderStatus::Pending] {
            for order in self.orders.list_by_status(status).await? {
                if !payment_still_pending(&order) {
                    continue;
                }
                summary.examined += 1;

                let age = order.age_at(self.clock.now());
                if age > self.config.timeout {
                    self.expire(order, &mut summary).await;
                } else if self.config.send_reminders
                    && age > self.config.timeout - self.config.reminder_lead
                    && !order.metadata.reminder_email_sent
                {
                    self.remind(order, &mut summary).await;
                }
            }
        }

        if summary.cancelled > 0 || summary.release_failures > 0 {
            tracing::info!(
                examined = summary.examined,
                cancelled = summary.cancelled,
                reminders = summary.reminders_sent,
                release_failures = summary.release_failures,
                "reaper pass finished"
            );
        }
        Ok(summary)
    }

    /// Runs forever on the given interval. Spawned as a background task.
    pub async fn run(self, interval: StdDuration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.run_once().await {
                tracing::error!(error = %err, "reaper pass failed");
            }
        }
    }

    /// Releases the order's reserved stock and cancels it.
    async fn expire(&self, order: Order, summary: &mut ReaperSummary) {
        let order_id = order.order_id;
        for item in &order.items {
            let Some(warehouse_id) = item.warehouse_id.clone() else {
                continue;
            };
            let key = steps::inventory_key(order_id, &item.product_id, InventoryAction::Release);
            let engine = self.engine.clone();
            let product = item.product_id.clone();
            let qty = item.quantity;

            let released: Result<()> = self
                .idempotency
                .execute_once(&key, "inventory-release", move || async move {
                    Ok(engine.release_at(&product, &warehouse_id, qty).await?)
                })
                .await;
            if let Err(err) = released {
                tracing::error!(
                    %order_id,
                    product = %item.product_id,
                    error = %err,
                    "abandoned-cart release failed, continuing"
                );
                summary.release_failures += 1;
            }
        }

        let observed = order.status;
        let mut cancelled = order;
        cancelled.metadata.cancel_reason = Some(CANCEL_REASON_ABANDONED.to_string());
        if let Err(err) = cancelled.transition(OrderStatus::Cancelled, self.clock.now()) {
            tracing::error!(%order_id, error = %err, "cannot cancel abandoned order");
            return;
        }

        match self.orders.put_if_status(cancelled, observed).await {
            Ok(()) => {
                metrics::counter!("reaper_cancelled_total").increment(1);
                tracing::info!(%order_id, "abandoned order cancelled");
                summary.cancelled += 1;
            }
            Err(StoreError::ConditionFailed { .. }) => {
                // Lost a race with the saga or a webhook; next tick
                // re-evaluates the fresh status.
                tracing::debug!(%order_id, "cancel lost status race, will retry next tick");
            }
            Err(err) => {
                tracing::error!(%order_id, error = %err, "abandoned-cart cancel failed");
            }
        }
    }

    /// Sends the one-time reminder and marks it on the order. A failed
    /// send never blocks the eventual cancellation.
    async fn remind(&self, order: Order, summary: &mut ReaperSummary) {
        let order_id = order.order_id;
        let resume_url = format!("{}/cart?orderId={order_id}", self.config.frontend_url);

        if let Err(err) = self
            .notifications
            .send_abandoned_cart_reminder(&order, &resume_url)
            .await
        {
            tracing::warn!(%order_id, error = %err, "reminder email failed");
            return;
        }
        summary.reminders_sent += 1;

        let observed = order.status;
        let mut updated = order;
        updated.metadata.reminder_email_sent = true;
        updated.updated_at = self.clock.now();
        if let Err(err) = self.orders.put_if_status(updated, observed).await {
            // Worst case the flag is lost and one extra email goes out.
            tracing::debug!(%order_id, error = %err, "could not persist reminder flag");
        }
    }
}

fn payment_still_pending(order: &Order) -> bool {
    matches!(order.payment_status, None | Some(PaymentStatus::Pending))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_still_pending() {
        use chrono::Utc;
        use common::{CustomerId, Money};
        use domain::{OrderItem, ShippingAddress};

        let mut order = Order::new(
            CustomerId::new(),
            vec![OrderItem::new("P1", "Widget", 1, Money::from_cents(100))],
            ShippingAddress {
                street: "1 Main St".into(),
                city: "Springfield".into(),
                state: "IL".into(),
                postal_code: "62701".into(),
                country: "US".into(),
            },
            Utc::now(),
        )
        .unwrap();

        assert!(payment_still_pending(&order));
        order.payment_status = Some(PaymentStatus::Pending);
        assert!(payment_still_pending(&order));
        order.payment_status = Some(PaymentStatus::Succeeded);
        assert!(!payment_still_pending(&order));
    }

    #[test]
    fn test_default_config() {
        let config = ReaperConfig::default();
        assert_eq!(config.timeout, Duration::minutes(30));
        assert_eq!(config.reminder_lead, Duration::minutes(5));
        assert!(!config.send_reminders);
    }
}
