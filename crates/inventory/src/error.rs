//! Inventory engine error types.

use common::{ProductId, WarehouseId};
use store::StoreError;
use thiserror::Error;

/// Errors raised by inventory engine operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// No warehouse has enough available stock for the requested quantity.
    #[error("Insufficient inventory for {product_id}: requested {requested}")]
    Insufficient { product_id: ProductId, requested: u32 },

    /// The conditional write lost: version mismatch or the predicate
    /// (available/reserved bound) no longer holds. Callers distinguish
    /// "out of stock" from plain contention only after a re-read.
    #[error("Concurrency conflict on {product_id}@{warehouse_id}")]
    Conflict {
        product_id: ProductId,
        warehouse_id: WarehouseId,
    },

    /// The addressed inventory row does not exist.
    #[error("Inventory row not found: {product_id}@{warehouse_id}")]
    NotFound {
        product_id: ProductId,
        warehouse_id: WarehouseId,
    },

    /// Store-level failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
