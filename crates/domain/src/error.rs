//! Domain error types.

use common::{Money, ProductId};
use thiserror::Error;

use crate::order::OrderStatus;

/// Errors raised by order invariants and the status state machine.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The requested status transition is not allowed.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// An item has a non-positive quantity.
    #[error("Invalid quantity for {product_id}: {quantity}")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    /// An item's price is not positive.
    #[error("Invalid price for {product_id}: {price}")]
    InvalidPrice { product_id: ProductId, price: Money },

    /// An order must contain at least one item.
    #[error("Order has no items")]
    NoItems,

    /// The order total does not equal the sum of its item totals.
    #[error("Order total {total} does not match item sum {item_sum}")]
    TotalMismatch { total: Money, item_sum: Money },

    /// An item total does not equal quantity times unit price.
    #[error("Item total for {product_id} does not match quantity x unit price")]
    ItemTotalMismatch { product_id: ProductId },
}
