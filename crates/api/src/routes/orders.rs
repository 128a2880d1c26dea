//! Order creation and lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Clock as _, CustomerId, OrderId, ProductId};
use domain::{Order, OrderItem, ShippingAddress};
use saga::PaymentGateway as _;
use serde::{Deserialize, Serialize};
use store::{OrderStore as _, ProductStore as _};

use crate::context::AppContext;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_id: String,
    pub items: Vec<CreateOrderItemRequest>,
    pub shipping_address: ShippingAddressDto,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderItemRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddressDto {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

impl From<ShippingAddressDto> for ShippingAddress {
    fn from(dto: ShippingAddressDto) -> Self {
        ShippingAddress {
            street: dto.street,
            city: dto.city,
            state: dto.state,
            postal_code: dto.postal_code,
            country: dto.country,
        }
    }
}

impl From<&ShippingAddress> for ShippingAddressDto {
    fn from(address: &ShippingAddress) -> Self {
        ShippingAddressDto {
            street: address.street.clone(),
            city: address.city.clone(),
            state: address.state.clone(),
            postal_code: address.postal_code.clone(),
            country: address.country.clone(),
        }
    }
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedResponse {
    pub order_id: String,
    pub client_secret: String,
    pub total_amount: i64,
    pub status: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemDto {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub price_per_unit: i64,
    pub total_price: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDto {
    pub order_id: String,
    pub customer_id: String,
    pub items: Vec<OrderItemDto>,
    pub total_amount: i64,
    pub status: String,
    pub shipping_address: ShippingAddressDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub metadata: serde_json::Value,
}

impl From<&Order> for OrderDto {
    fn from(order: &Order) -> Self {
        OrderDto {
            order_id: order.order_id.to_string(),
            customer_id: order.customer_id.to_string(),
            items: order
                .items
                .iter()
                .map(|item| OrderItemDto {
                    product_id: item.product_id.to_string(),
                    product_name: item.product_name.clone(),
                    quantity: item.quantity,
                    price_per_unit: item.price_per_unit.cents(),
                    total_price: item.total_price.cents(),
                    warehouse_id: item.warehouse_id.as_ref().map(|w| w.to_string()),
                })
                .collect(),
            total_amount: order.total_amount.cents(),
            status: order.status.as_str().to_string(),
            shipping_address: (&order.shipping_address).into(),
            payment_intent_id: order.payment_intent_id.clone(),
            payment_status: order.payment_status.map(|s| s.as_str().to_string()),
            payment_method: order.payment_method.clone(),
            tracking_number: order.tracking_number.clone(),
            carrier: order.carrier.clone(),
            estimated_delivery: order.estimated_delivery.map(|d| d.to_rfc3339()),
            created_at: order.created_at.to_rfc3339(),
            updated_at: order.updated_at.to_rfc3339(),
            metadata: serde_json::to_value(&order.metadata).unwrap_or(serde_json::Value::Null),
        }
    }
}

// -- Handlers --

/// POST /orders — create a PENDING order with a minted payment intent.
///
/// Validates each item against the catalog, pre-checks aggregate
/// availability across warehouses, and prices items from the catalog.
#[tracing::instrument(skip(ctx, req))]
pub async fn create(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let customer_id = CustomerId::parse(&req.customer_id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid customerId: {e}")))?;

    if req.items.is_empty() {
        return Err(ApiError::BadRequest(
            "Order must contain at least one item".to_string(),
        ));
    }

    let mut items = Vec::with_capacity(req.items.len());
    for item_req in &req.items {
        if item_req.quantity == 0 {
            return Err(ApiError::BadRequest(format!(
                "Quantity for {} must be positive",
                item_req.product_id
            )));
        }

        let product_id = ProductId::new(item_req.product_id.as_str());
        let product = ctx
            .products
            .get(&product_id)
            .await?
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown product: {product_id}")))?;
        if !product.active {
            return Err(ApiError::BadRequest(format!(
                "Product {product_id} is not available"
            )));
        }

        // Pre-check only; the saga's reservation step is what actually
        // guards against overselling.
        let levels = ctx.engine.levels_for_product(&product_id).await?;
        let available: u32 = levels.iter().map(|l| l.available()).sum();
        if available < item_req.quantity {
            return Err(ApiError::BadRequest(format!(
                "Insufficient stock for {product_id}: requested {}, available {available}",
                item_req.quantity
            )));
        }

        items.push(OrderItem::new(
            product_id,
            product.name,
            item_req.quantity,
            product.price,
        ));
    }

    let mut order = Order::new(customer_id, items, req.shipping_address.into(), ctx.clock.now())?;
    let intent = ctx
        .payment
        .create_intent(order.total_amount, order.order_id)
        .await?;
    order.payment_intent_id = Some(intent.id);
    ctx.orders.put_new(order.clone()).await?;

    tracing::info!(order_id = %order.order_id, total = order.total_amount.cents(), "order created");
    Ok((
        StatusCode::CREATED,
        Json(OrderCreatedResponse {
            order_id: order.order_id.to_string(),
            client_secret: intent.client_secret,
            total_amount: order.total_amount.cents(),
            status: order.status.as_str().to_string(),
        }),
    ))
}

/// GET /orders/{id} — load an order by ID.
#[tracing::instrument(skip(ctx))]
pub async fn get(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<OrderDto>, ApiError> {
    let order_id =
        OrderId::parse(&id).map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))?;
    let order = ctx
        .orders
        .get(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    Ok(Json((&order).into()))
}
