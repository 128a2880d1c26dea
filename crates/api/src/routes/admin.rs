//! Admin endpoints, gated by session tokens issued out-of-band.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use common::{Clock as _, CustomerId, OrderId};
use domain::OrderStatus;
use saga::CompensationOp;
use serde::{Deserialize, Serialize};
use store::{OrderStore as _, SessionStore as _};

use crate::context::AppContext;
use crate::error::ApiError;
use crate::routes::orders::OrderDto;

/// Header carrying the admin session token.
pub const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";

#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub order_id: String,
    pub success: bool,
    pub operations: Vec<CompensationOp>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub status: Option<String>,
    pub customer_id: Option<String>,
}

/// Validates the session token against the session store (the authorizer
/// pattern: admin session issuance happens elsewhere).
async fn authorize(ctx: &AppContext, headers: &HeaderMap) -> Result<(), ApiError> {
    let token = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing admin session token".to_string()))?;

    let session = ctx
        .sessions
        .get(token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid admin session".to_string()))?;
    if !session.is_valid_at(ctx.clock.now_epoch()) {
        return Err(ApiError::Unauthorized("Admin session expired".to_string()));
    }
    Ok(())
}

/// POST /admin/orders/{id}/cancel — compensate an order synchronously.
///
/// Rejected once shipping is allocated; backing out a shipped order is an
/// operator-tooling concern.
#[tracing::instrument(skip(ctx, headers, req))]
pub async fn cancel(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<CancelResponse>, ApiError> {
    authorize(&ctx, &headers).await?;

    let order_id =
        OrderId::parse(&id).map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))?;
    if req.reason.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Cancellation reason is required".to_string(),
        ));
    }

    let order = ctx
        .orders
        .get(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    if order.status == OrderStatus::ShippingAllocated {
        return Err(ApiError::Conflict(
            "Order has already been allocated shipping".to_string(),
        ));
    }

    let report = ctx
        .orchestrator
        .compensation_handler()
        .compensate(order_id, "admin-cancellation", req.reason.trim())
        .await?;

    tracing::info!(%order_id, success = report.success, "admin cancellation");
    Ok(Json(CancelResponse {
        order_id: order_id.to_string(),
        success: report.success,
        operations: report.operations,
    }))
}

/// GET /admin/orders — list orders by status or by customer.
#[tracing::instrument(skip(ctx, headers))]
pub async fn list(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<OrderDto>>, ApiError> {
    authorize(&ctx, &headers).await?;

    let orders = match (params.status.as_deref(), params.customer_id.as_deref()) {
        (Some(status), None) => {
            let status = OrderStatus::parse(status)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown status: {status}")))?;
            ctx.orders.list_by_status(status).await?
        }
        (None, Some(customer_id)) => {
            let customer_id = CustomerId::parse(customer_id)
                .map_err(|e| ApiError::BadRequest(format!("Invalid customerId: {e}")))?;
            ctx.orders.list_by_customer(customer_id).await?
        }
        _ => {
            return Err(ApiError::BadRequest(
                "Provide exactly one of status or customerId".to_string(),
            ));
        }
    };

    Ok(Json(orders.iter().map(OrderDto::from).collect()))
}
