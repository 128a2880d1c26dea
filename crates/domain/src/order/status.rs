//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its fulfillment lifecycle.
///
/// Status transitions:
/// ```text
/// PENDING ──► INVENTORY_RESERVED ──► PAYMENT_CONFIRMED ──► SHIPPING_ALLOCATED
///    │                │                      │
///    └────────────────┴──────────────────────┴──► CANCELLED
/// ```
///
/// `SHIPPING_ALLOCATED` is the terminal success state; `CANCELLED` is the
/// terminal failure state. `FAILED` is reserved for fatal internal faults
/// flagged by operators and is never written by the fulfillment flow.
///
/// The serialized forms are the exact strings used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order created, payment not yet confirmed.
    #[default]
    #[serde(rename = "PENDING")]
    Pending,

    /// Inventory has been reserved across warehouses.
    #[serde(rename = "INVENTORY_RESERVED")]
    InventoryReserved,

    /// Payment verified against the provider.
    #[serde(rename = "PAYMENT_CONFIRMED")]
    PaymentConfirmed,

    /// Shipping allocated; terminal success state.
    #[serde(rename = "SHIPPING_ALLOCATED")]
    ShippingAllocated,

    /// Order was cancelled (terminal state). Soft: the record is retained.
    #[serde(rename = "CANCELLED")]
    Cancelled,

    /// Reserved for fatal internal faults; never emitted on the success path.
    #[serde(rename = "FAILED")]
    Failed,
}

impl OrderStatus {
    /// Returns true if a transition from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, InventoryReserved)
                | (InventoryReserved, PaymentConfirmed)
                | (PaymentConfirmed, ShippingAllocated)
                | (Pending, Cancelled)
                | (InventoryReserved, Cancelled)
                | (PaymentConfirmed, Cancelled)
                | (ShippingAllocated, Cancelled)
        )
    }

    /// Returns true if the order can still be cancelled from this status.
    pub fn can_cancel(&self) -> bool {
        self.can_transition_to(OrderStatus::Cancelled)
    }

    /// Returns true if this is a terminal state (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::ShippingAllocated | OrderStatus::Cancelled | OrderStatus::Failed
        )
    }

    /// Parses a wire status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OrderStatus::Pending),
            "INVENTORY_RESERVED" => Some(OrderStatus::InventoryReserved),
            "PAYMENT_CONFIRMED" => Some(OrderStatus::PaymentConfirmed),
            "SHIPPING_ALLOCATED" => Some(OrderStatus::ShippingAllocated),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            "FAILED" => Some(OrderStatus::Failed),
            _ => None,
        }
    }

    /// Returns the wire representation of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::InventoryReserved => "INVENTORY_RESERVED",
            OrderStatus::PaymentConfirmed => "PAYMENT_CONFIRMED",
            OrderStatus::ShippingAllocated => "SHIPPING_ALLOCATED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
