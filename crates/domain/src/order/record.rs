//! The order record.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId};
use serde::{Deserialize, Serialize};

use crate::error::OrderError;
use crate::payment::PaymentStatus;

use super::{OrderItem, OrderMetadata, OrderStatus, ShippingAddress};

/// An order as persisted in the order store.
///
/// Orders are created once, mutated by the saga orchestrator, compensation
/// handler, reaper and admin cancellation, and never deleted (CANCELLED is
/// soft). Status changes go through [`Order::transition`] so the state
/// machine in [`OrderStatus`] cannot be bypassed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub items: Vec<OrderItem>,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub shipping_address: ShippingAddress,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "OrderMetadata::is_empty")]
    pub metadata: OrderMetadata,
}

impl Order {
    /// Creates a new PENDING order, validating item and total invariants.
    pub fn new(
        customer_id: CustomerId,
        items: Vec<OrderItem>,
        shipping_address: ShippingAddress,
        created_at: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }
        for item in &items {
            item.validate()?;
        }
        let total_amount = items.iter().map(|i| i.total_price).sum();

        Ok(Self {
            order_id: OrderId::new(),
            customer_id,
            items,
            total_amount,
            status: OrderStatus::Pending,
            shipping_address,
            payment_intent_id: None,
            payment_status: None,
            payment_method: None,
            tracking_number: None,
            carrier: None,
            estimated_delivery: None,
            created_at,
            updated_at: created_at,
            metadata: OrderMetadata::default(),
        })
    }

    /// Moves the order to `next`, enforcing the status state machine.
    pub fn transition(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Re-asserts the money invariants on a persisted record.
    pub fn verify_totals(&self) -> Result<(), OrderError> {
        for item in &self.items {
            item.validate()?;
        }
        let item_sum: Money = self.items.iter().map(|i| i.total_price).sum();
        if self.total_amount != item_sum {
            return Err(OrderError::TotalMismatch {
                total: self.total_amount,
                item_sum,
            });
        }
        Ok(())
    }

    /// Returns true if every item carries a warehouse assignment.
    pub fn fully_reserved(&self) -> bool {
        self.items.iter().all(|i| i.warehouse_id.is_some())
    }

    /// Age of the order at `now`.
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::WarehouseId;

    fn address() -> ShippingAddress {
        ShippingAddress {
            street: "4200 Fifth Ave".into(),
            city: "Pittsburgh".into(),
            state: "PA".into(),
            postal_code: "15260".into(),
            country: "US".into(),
        }
    }

    fn order_with(items: Vec<OrderItem>) -> Result<Order, OrderError> {
        Order::new(CustomerId::new(), items, address(), Utc::now())
    }

    #[test]
    fn test_new_computes_total() {
        let order = order_with(vec![
            OrderItem::new("P1", "Widget", 2, Money::from_cents(1999)),
            OrderItem::new("P2", "Gadget", 1, Money::from_cents(2500)),
        ])
        .unwrap();

        assert_eq!(order.total_amount.cents(), 6498);
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.verify_totals().is_ok());
    }

    #[test]
    fn test_empty_order_rejected() {
        assert!(matches!(order_with(vec![]), Err(OrderError::NoItems)));
    }

    #[test]
    fn test_invalid_item_rejected() {
        let result = order_with(vec![OrderItem::new("P1", "Widget", 0, Money::from_cents(1))]);
        assert!(matches!(result, Err(OrderError::InvalidQuantity { .. })));
    }

    #[test]
    fn test_transition_follows_state_machine() {
        let mut order =
            order_with(vec![OrderItem::new("P1", "Widget", 1, Money::from_cents(100))]).unwrap();

        order
            .transition(OrderStatus::InventoryReserved, Utc::now())
            .unwrap();
        order
            .transition(OrderStatus::PaymentConfirmed, Utc::now())
            .unwrap();
        order
            .transition(OrderStatus::ShippingAllocated, Utc::now())
            .unwrap();
        assert!(order.status.is_terminal());
    }

    #[test]
    fn test_transition_rejects_skips() {
        let mut order =
            order_with(vec![OrderItem::new("P1", "Widget", 1, Money::from_cents(100))]).unwrap();

        let err = order
            .transition(OrderStatus::PaymentConfirmed, Utc::now())
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_cancelled_is_sticky() {
        let mut order =
            order_with(vec![OrderItem::new("P1", "Widget", 1, Money::from_cents(100))]).unwrap();
        order.transition(OrderStatus::Cancelled, Utc::now()).unwrap();

        let err = order
            .transition(OrderStatus::InventoryReserved, Utc::now())
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));
    }

    #[test]
    fn test_fully_reserved() {
        let mut order = order_with(vec![
            OrderItem::new("P1", "Widget", 1, Money::from_cents(100)),
            OrderItem::new("P2", "Gadget", 1, Money::from_cents(100)),
        ])
        .unwrap();
        assert!(!order.fully_reserved());

        for item in &mut order.items {
            item.warehouse_id = Some(WarehouseId::new("W1"));
        }
        assert!(order.fully_reserved());
    }

    #[test]
    fn test_tampered_total_detected() {
        let mut order =
            order_with(vec![OrderItem::new("P1", "Widget", 2, Money::from_cents(1999))]).unwrap();
        order.total_amount = Money::from_cents(1);
        assert!(matches!(
            order.verify_totals(),
            Err(OrderError::TotalMismatch { .. })
        ));
    }

    #[test]
    fn test_status_serializes_to_wire_string() {
        let order =
            order_with(vec![OrderItem::new("P1", "Widget", 1, Money::from_cents(100))]).unwrap();
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["status"], "PENDING");
    }
}
