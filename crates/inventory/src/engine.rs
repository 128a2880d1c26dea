//! The inventory engine.

use std::sync::Arc;
use std::time::Duration;

use common::{Clock, ProductId, WarehouseId};
use store::{InventoryLevel, InventoryStore, StoreError};

use crate::error::{InventoryError, Result};

/// Attempts per warehouse before moving to the next candidate.
const RESERVE_ATTEMPTS: u32 = 3;

/// Backoff between conflicting attempts is `100ms * attempt`.
const CONFLICT_BACKOFF: Duration = Duration::from_millis(100);

/// Versioned read-modify-write engine over the inventory store.
///
/// Every mutation reads a row, applies the change to the copy, and writes
/// it back conditioned on the version it read. A lost condition surfaces
/// as [`InventoryError::Conflict`]; the caller re-reads and retries.
#[derive(Clone)]
pub struct InventoryEngine {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
}

impl InventoryEngine {
    /// Creates a new engine over the given store.
    pub fn new(store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Reads the current row for a `(product, warehouse)` pair.
    pub async fn get(
        &self,
        product_id: &ProductId,
        warehouse_id: &WarehouseId,
    ) -> Result<InventoryLevel> {
        self.store
            .get(product_id, warehouse_id)
            .await?
            .ok_or_else(|| InventoryError::NotFound {
                product_id: product_id.clone(),
                warehouse_id: warehouse_id.clone(),
            })
    }

    /// Lists every warehouse row for a product, in index order.
    pub async fn levels_for_product(&self, product_id: &ProductId) -> Result<Vec<InventoryLevel>> {
        Ok(self.store.list_for_product(product_id).await?)
    }

    /// Reserves `qty` units. Precondition (enforced by the conditional
    /// write): the row is at `expected_version` and has `qty` available.
    pub async fn reserve(
        &self,
        product_id: &ProductId,
        warehouse_id: &WarehouseId,
        qty: u32,
        expected_version: u64,
    ) -> Result<InventoryLevel> {
        self.mutate(product_id, warehouse_id, expected_version, |row| {
            if row.available() < qty {
                return false;
            }
            row.reserved += qty;
            true
        })
        .await
    }

    /// Releases `qty` previously reserved units back to available.
    pub async fn release(
        &self,
        product_id: &ProductId,
        warehouse_id: &WarehouseId,
        qty: u32,
        expected_version: u64,
    ) -> Result<InventoryLevel> {
        self.mutate(product_id, warehouse_id, expected_version, |row| {
            if row.reserved < qty {
                return false;
            }
            row.reserved -= qty;
            true
        })
        .await
    }

    /// Confirms physical dispatch of `qty` reserved units: both the
    /// reservation and the on-hand quantity drop by the shipped amount.
    /// The fulfillment saga's success path stops at shipping allocation
    /// and does not call this; dispatch tooling does.
    pub async fn confirm_shipment(
        &self,
        product_id: &ProductId,
        warehouse_id: &WarehouseId,
        qty: u32,
        expected_version: u64,
    ) -> Result<InventoryLevel> {
        self.mutate(product_id, warehouse_id, expected_version, |row| {
            if row.reserved < qty || row.quantity < qty {
                return false;
            }
            row.reserved -= qty;
            row.quantity -= qty;
            true
        })
        .await
    }

    /// Adds `qty_to_add` units of on-hand stock.
    pub async fn restock(
        &self,
        product_id: &ProductId,
        warehouse_id: &WarehouseId,
        qty_to_add: u32,
        expected_version: u64,
    ) -> Result<InventoryLevel> {
        self.mutate(product_id, warehouse_id, expected_version, |row| {
            row.quantity += qty_to_add;
            true
        })
        .await
    }

    /// Reserves `qty` of a product from whichever warehouse can satisfy it.
    ///
    /// Walks the product's warehouse rows in index order, skipping rows
    /// without enough available stock. Each candidate gets up to
    /// [`RESERVE_ATTEMPTS`] tries with a fresh read and linear backoff
    /// before the walk moves on. Returns the warehouse that took the
    /// reservation, or [`InventoryError::Insufficient`] when none could.
    #[tracing::instrument(skip(self), fields(%product_id))]
    pub async fn reserve_anywhere(&self, product_id: &ProductId, qty: u32) -> Result<WarehouseId> {
        let candidates = self.store.list_for_product(product_id).await?;

        for candidate in &candidates {
            if candidate.available() < qty {
                continue;
            }

            for attempt in 1..=RESERVE_ATTEMPTS {
                // Re-read for the freshest version before each attempt.
                let Some(fresh) = self
                    .store
                    .get(product_id, &candidate.warehouse_id)
                    .await?
                else {
                    break;
                };
                if fresh.available() < qty {
                    // Genuinely out of stock here; try the next warehouse.
                    break;
                }

                match self
                    .reserve(product_id, &candidate.warehouse_id, qty, fresh.version)
                    .await
                {
                    Ok(_) => {
                        tracing::debug!(
                            warehouse = %candidate.warehouse_id,
                            qty,
                            attempt,
                            "reserved"
                        );
                        return Ok(candidate.warehouse_id.clone());
                    }
                    Err(InventoryError::Conflict { .. }) if attempt < RESERVE_ATTEMPTS => {
                        tokio::time::sleep(CONFLICT_BACKOFF * attempt).await;
                    }
                    Err(InventoryError::Conflict { .. }) => {
                        tracing::debug!(
                            warehouse = %candidate.warehouse_id,
                            "contention exhausted retries, trying next warehouse"
                        );
                        break;
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        Err(InventoryError::Insufficient {
            product_id: product_id.clone(),
            requested: qty,
        })
    }

    /// Releases `qty` of a product at a known warehouse, absorbing version
    /// races with bounded re-read retries. Used by compensation and the
    /// reaper, where the caller knows exactly where the reservation lives.
    #[tracing::instrument(skip(self), fields(%product_id, %warehouse_id))]
    pub async fn release_at(
        &self,
        product_id: &ProductId,
        warehouse_id: &WarehouseId,
        qty: u32,
    ) -> Result<()> {
        for attempt in 1..=RESERVE_ATTEMPTS {
            let fresh = self.get(product_id, warehouse_id).await?;
            match self
                .release(product_id, warehouse_id, qty, fresh.version)
                .await
            {
                Ok(_) => return Ok(()),
                Err(InventoryError::Conflict { .. }) if attempt < RESERVE_ATTEMPTS => {
                    tokio::time::sleep(CONFLICT_BACKOFF * attempt).await;
                }
                Err(other) => return Err(other),
            }
        }
        Err(InventoryError::Conflict {
            product_id: product_id.clone(),
            warehouse_id: warehouse_id.clone(),
        })
    }

    /// Read-modify-conditional-write core shared by all mutations.
    ///
    /// `apply` returns false when the row cannot satisfy the operation's
    /// predicate; that surfaces as the same `Conflict` a lost version race
    /// produces, mirroring a conditional-write store where both are one
    /// failed condition expression.
    async fn mutate(
        &self,
        product_id: &ProductId,
        warehouse_id: &WarehouseId,
        expected_version: u64,
        apply: impl FnOnce(&mut InventoryLevel) -> bool,
    ) -> Result<InventoryLevel> {
        let conflict = || InventoryError::Conflict {
            product_id: product_id.clone(),
            warehouse_id: warehouse_id.clone(),
        };

        let mut row = self.get(product_id, warehouse_id).await?;
        if row.version != expected_version {
            return Err(conflict());
        }
        if !apply(&mut row) {
            return Err(conflict());
        }
        row.version += 1;
        row.updated_at = self.clock.now();

        match self.store.put_if_version(row.clone(), expected_version).await {
            Ok(()) => Ok(row),
            Err(StoreError::ConditionFailed { .. }) => Err(conflict()),
            Err(other) => Err(other.into()),
        }
    }
}
