//! Payment provider webhook endpoint.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::Serialize;

use crate::context::AppContext;
use crate::error::ApiError;

/// Header carrying the payment provider signature (`t=...,v1=...`).
pub const SIGNATURE_HEADER: &str = "Payment-Signature";

#[derive(Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// POST /webhooks/payment — signed payment provider event.
///
/// Always answers `{ "received": true }` once the event is verified and
/// dispatched (including duplicates and ignored event types); signature
/// failures are 400.
#[tracing::instrument(skip_all)]
pub async fn payment(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    ctx.ingress.handle(&body, signature).await?;
    Ok(Json(WebhookAck { received: true }))
}
