//! Order line items and shipping addresses.

use common::{Money, ProductId, WarehouseId};
use serde::{Deserialize, Serialize};

use crate::error::OrderError;

/// A line item in an order.
///
/// `total_price` is persisted rather than derived so the stored record is
/// self-checking: `validate` re-asserts `total_price == quantity * price_per_unit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The product identifier.
    pub product_id: ProductId,

    /// Human-readable product name, denormalized at order creation.
    pub product_name: String,

    /// Quantity ordered. Always positive.
    pub quantity: u32,

    /// Price per unit in minor currency units.
    pub price_per_unit: Money,

    /// Line total (`quantity * price_per_unit`).
    pub total_price: Money,

    /// Warehouse the item was reserved from. Set by the reservation step;
    /// present on every item once the order is INVENTORY_RESERVED.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<WarehouseId>,
}

impl OrderItem {
    /// Creates a new order item, computing the line total.
    pub fn new(
        product_id: impl Into<ProductId>,
        product_name: impl Into<String>,
        quantity: u32,
        price_per_unit: Money,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity,
            price_per_unit,
            total_price: price_per_unit.multiply(quantity),
            warehouse_id: None,
        }
    }

    /// Checks the item invariants: positive quantity, positive price, and
    /// a consistent line total.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                product_id: self.product_id.clone(),
                quantity: self.quantity,
            });
        }
        if !self.price_per_unit.is_positive() {
            return Err(OrderError::InvalidPrice {
                product_id: self.product_id.clone(),
                price: self.price_per_unit,
            });
        }
        if self.total_price != self.price_per_unit.multiply(self.quantity) {
            return Err(OrderError::ItemTotalMismatch {
                product_id: self.product_id.clone(),
            });
        }
        Ok(())
    }
}

/// A customer shipping address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}
