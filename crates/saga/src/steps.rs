//! Step names and idempotency key encodings.

use common::{OrderId, ProductId};

/// Step name: reserve inventory across warehouses.
pub const STEP_RESERVE_INVENTORY: &str = "reserve-inventory";

/// Step name: verify the payment intent against the provider.
pub const STEP_VERIFY_PAYMENT: &str = "payment-verification";

/// Step name: allocate shipping and mint a tracking number.
pub const STEP_ALLOCATE_SHIPPING: &str = "allocate-shipping";

/// Step name: send the order confirmation email.
pub const STEP_SEND_NOTIFICATION: &str = "send-notification";

/// Per-item inventory action, used in inventory idempotency keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryAction {
    Reserve,
    Release,
}

impl InventoryAction {
    fn as_str(&self) -> &'static str {
        match self {
            InventoryAction::Reserve => "reserve",
            InventoryAction::Release => "release",
        }
    }
}

/// Key for a saga step checkpoint: `order:{orderId}:{step}`.
pub fn order_step_key(order_id: OrderId, step: &str) -> String {
    format!("order:{order_id}:{step}")
}

/// Key for a payment operation: `payment:{orderId}:{paymentIntentId}`.
pub fn payment_key(order_id: OrderId, payment_intent_id: &str) -> String {
    format!("payment:{order_id}:{payment_intent_id}")
}

/// Key for a per-item inventory action:
/// `inventory:{orderId}:{productId}:{reserve|release}`.
pub fn inventory_key(order_id: OrderId, product_id: &ProductId, action: InventoryAction) -> String {
    format!("inventory:{order_id}:{product_id}:{}", action.as_str())
}
