//! Inventory store contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ProductId, WarehouseId};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Stock level for one `(product, warehouse)` pair.
///
/// `reserved` defaults to 0 on deserialization: rows written before the
/// reservation machinery existed carry no `reserved` attribute, and the
/// read path backfills it (schema-evolution accommodation, not a
/// correctness feature).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLevel {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,

    /// Units physically on hand.
    pub quantity: u32,

    /// Units allocated to open orders. Invariant: `reserved <= quantity`.
    #[serde(default)]
    pub reserved: u32,

    /// Monotonic version; strictly increases on every successful write.
    pub version: u64,

    pub updated_at: DateTime<Utc>,
}

impl InventoryLevel {
    /// Units available for new reservations.
    pub fn available(&self) -> u32 {
        self.quantity.saturating_sub(self.reserved)
    }
}

/// Durable storage for inventory rows.
///
/// Rows are keyed by `(product_id, warehouse_id)`; a secondary index lists
/// every warehouse row for a product in insertion order. All mutation by
/// the engine goes through [`InventoryStore::put_if_version`] — the
/// conditional write is the only concurrency-control primitive.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Reads one row.
    async fn get(&self, product_id: &ProductId, warehouse_id: &WarehouseId)
    -> Result<Option<InventoryLevel>>;

    /// Lists all warehouse rows for a product, in insertion order.
    async fn list_for_product(&self, product_id: &ProductId) -> Result<Vec<InventoryLevel>>;

    /// Unconditionally writes a row (out-of-band seeding).
    async fn put(&self, level: InventoryLevel) -> Result<()>;

    /// Replaces the stored row if its current version equals `expected_version`.
    ///
    /// Fails with `ConditionFailed` on a version mismatch or a missing row.
    async fn put_if_version(&self, level: InventoryLevel, expected_version: u64) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_subtracts_reserved() {
        let level = InventoryLevel {
            product_id: "P1".into(),
            warehouse_id: "W1".into(),
            quantity: 10,
            reserved: 3,
            version: 1,
            updated_at: Utc::now(),
        };
        assert_eq!(level.available(), 7);
    }

    #[test]
    fn test_missing_reserved_defaults_to_zero() {
        let json = serde_json::json!({
            "product_id": "P1",
            "warehouse_id": "W1",
            "quantity": 100,
            "version": 5,
            "updated_at": Utc::now(),
        });
        let level: InventoryLevel = serde_json::from_value(json).unwrap();
        assert_eq!(level.reserved, 0);
        assert_eq!(level.available(), 100);
    }
}
