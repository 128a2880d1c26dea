//! Product catalog store contract.

use async_trait::async_trait;
use common::ProductId;
use domain::Product;

use crate::error::Result;

/// Durable storage for the product catalog.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Reads a product by ID.
    async fn get(&self, product_id: &ProductId) -> Result<Option<Product>>;

    /// Upserts a product.
    async fn put(&self, product: Product) -> Result<()>;
}
