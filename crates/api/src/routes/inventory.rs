//! Inventory availability endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::ProductId;
use serde::Serialize;
use store::ProductStore as _;

use crate::context::AppContext;
use crate::error::ApiError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseAvailability {
    pub warehouse_id: String,
    pub available: u32,
    pub reserved: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryResponse {
    pub product_id: String,
    pub product_name: String,
    pub total_available: u32,
    pub total_reserved: u32,
    pub warehouses: Vec<WarehouseAvailability>,
    pub in_stock: bool,
}

/// GET /inventory/{productId} — per-warehouse and aggregate availability.
#[tracing::instrument(skip(ctx))]
pub async fn get(
    State(ctx): State<Arc<AppContext>>,
    Path(product_id): Path<String>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let product_id = ProductId::new(product_id);
    let product = ctx
        .products
        .get(&product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {product_id} not found")))?;

    let levels = ctx.engine.levels_for_product(&product_id).await?;
    let warehouses: Vec<WarehouseAvailability> = levels
        .iter()
        .map(|level| WarehouseAvailability {
            warehouse_id: level.warehouse_id.to_string(),
            available: level.available(),
            reserved: level.reserved,
        })
        .collect();

    let total_available = warehouses.iter().map(|w| w.available).sum();
    let total_reserved = warehouses.iter().map(|w| w.reserved).sum();

    Ok(Json(InventoryResponse {
        product_id: product_id.to_string(),
        product_name: product.name,
        total_available,
        total_reserved,
        warehouses,
        in_stock: total_available > 0,
    }))
}
