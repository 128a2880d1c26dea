//! Product catalog records.

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

/// A catalog product. Read-mostly; priced in minor currency units.
///
/// Inactive products are rejected at order creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub active: bool,
}

impl Product {
    /// Creates an active product with no image.
    pub fn new(
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        price: Money,
        category: impl Into<String>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            description: String::new(),
            price,
            category: category.into(),
            image_url: None,
            active: true,
        }
    }
}
