//! Payment provider webhook ingress.
//!
//! Translates asynchronous `payment_intent.*` events into saga triggers.
//! Replay safety lives in the order-status gate: an order that is no
//! longer PENDING treats any further `succeeded` event as a duplicate.

use std::collections::HashMap;
use std::sync::Arc;

use common::{Clock, OrderId};
use domain::{OrderStatus, PaymentStatus};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use store::{OrderStore, StoreError, with_backoff};
use thiserror::Error;

use crate::error::SagaError;
use crate::orchestrator::SagaOrchestrator;

type HmacSha256 = Hmac<Sha256>;

/// Event type: the customer's payment went through.
pub const EVENT_PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";
/// Event type: the payment attempt failed.
pub const EVENT_PAYMENT_FAILED: &str = "payment_intent.payment_failed";
/// Event type: the intent was canceled at the provider.
pub const EVENT_PAYMENT_CANCELED: &str = "payment_intent.canceled";

/// Errors raised while handling a webhook request.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// No signing secret configured and unverified parse is not allowed.
    #[error("Webhook signing secret is not configured")]
    MissingSecret,

    /// The signature header is not `t=...,v1=...`.
    #[error("Malformed signature header")]
    MalformedSignature,

    /// The signature does not match the request body.
    #[error("Webhook signature mismatch")]
    SignatureMismatch,

    /// The body is not a valid payment event.
    #[error("Invalid webhook payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The carried intent has no `metadata.orderId`.
    #[error("Event intent is missing metadata.orderId")]
    MissingOrderId,

    /// `metadata.orderId` is not a valid order ID.
    #[error("Invalid order id in intent metadata: {0}")]
    InvalidOrderId(String),

    /// The referenced order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Saga failure while triggering fulfillment.
    #[error(transparent)]
    Saga(#[from] SagaError),
}

/// A decoded payment provider event.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: PaymentEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEventData {
    pub object: PaymentIntentObject,
}

/// The payment intent carried inside an event.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    pub amount: i64,
    pub status: String,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PaymentIntentObject {
    fn order_id(&self) -> Result<OrderId, WebhookError> {
        let raw = self
            .metadata
            .get("orderId")
            .ok_or(WebhookError::MissingOrderId)?;
        OrderId::parse(raw).map_err(|_| WebhookError::InvalidOrderId(raw.clone()))
    }
}

/// Computes the signature header value for a payload: the HMAC-SHA256 of
/// `"{timestamp}.{payload}"` under `secret`, presented as
/// `t={timestamp},v1={hex}`.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verifies request signatures against the configured signing secret.
///
/// A missing secret downgrades to an unverified parse only when
/// `allow_unverified` is set (development mode); production configs must
/// carry the secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
    allow_unverified: bool,
}

impl WebhookVerifier {
    pub fn new(secret: Option<String>, allow_unverified: bool) -> Self {
        Self {
            secret,
            allow_unverified,
        }
    }

    /// Checks `signature_header` against the raw request body.
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> Result<(), WebhookError> {
        let Some(secret) = self.secret.as_deref() else {
            if self.allow_unverified {
                tracing::warn!("no webhook secret configured, accepting unverified event");
                return Ok(());
            }
            return Err(WebhookError::MissingSecret);
        };

        let (timestamp, signature) = parse_signature_header(signature_header)?;
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(payload);
        mac.verify_slice(&signature)
            .map_err(|_| WebhookError::SignatureMismatch)
    }
}

fn parse_signature_header(header: &str) -> Result<(i64, Vec<u8>), WebhookError> {
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        match part.split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signature = hex::decode(value).ok(),
            _ => {}
        }
    }
    match (timestamp, signature) {
        (Some(t), Some(sig)) => Ok((t, sig)),
        _ => Err(WebhookError::MalformedSignature),
    }
}

/// What the ingress did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// A `succeeded` event started (or finished) the fulfillment saga.
    SagaTriggered,
    /// The order had already left PENDING; nothing to do.
    Duplicate,
    /// A failure/cancellation event cancelled the order.
    OrderCancelled,
    /// Event type is not one we process.
    Ignored,
}

/// Validates payment provider callbacks and turns them into order
/// transitions and saga triggers.
#[derive(Clone)]
pub struct WebhookIngress {
    verifier: WebhookVerifier,
    orders: Arc<dyn OrderStore>,
    orchestrator: SagaOrchestrator,
    clock: Arc<dyn Clock>,
}

impl WebhookIngress {
    pub fn new(
        verifier: WebhookVerifier,
        orders: Arc<dyn OrderStore>,
        orchestrator: SagaOrchestrator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            verifier,
            orders,
            orchestrator,
            clock,
        }
    }

    /// Verifies, decodes and dispatches one webhook request.
    #[tracing::instrument(skip_all)]
    pub async fn handle(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookDisposition, WebhookError> {
        self.verifier.verify(payload, signature_header)?;
        let event: PaymentEvent = serde_json::from_slice(payload)?;
        metrics::counter!("webhook_events_total", "type" => event.event_type.clone()).increment(1);
        tracing::info!(event_id = %event.id, event_type = %event.event_type, "webhook event");

        match event.event_type.as_str() {
            EVENT_PAYMENT_SUCCEEDED => self.on_payment_succeeded(event.data.object).await,
            EVENT_PAYMENT_FAILED => {
                self.on_payment_terminal(event.data.object, PaymentStatus::Failed)
                    .await
            }
            EVENT_PAYMENT_CANCELED => {
                self.on_payment_terminal(event.data.object, PaymentStatus::Canceled)
                    .await
            }
            other => {
                tracing::debug!(event_type = other, "ignoring event type");
                Ok(WebhookDisposition::Ignored)
            }
        }
    }

    /// Persists the intent onto the PENDING order and triggers the saga.
    /// An order in any other status means this event was already
    /// processed: acknowledge without reprocessing.
    async fn on_payment_succeeded(
        &self,
        intent: PaymentIntentObject,
    ) -> Result<WebhookDisposition, WebhookError> {
        let order_id = intent.order_id()?;
        let order = with_backoff("orders.get", || self.orders.get(order_id))
            .await?
            .ok_or_else(|| WebhookError::OrderNotFound(order_id.to_string()))?;

        if order.status != OrderStatus::Pending {
            tracing::info!(%order_id, status = %order.status, "duplicate payment webhook");
            return Ok(WebhookDisposition::Duplicate);
        }

        let mut updated = order;
        updated.payment_intent_id = Some(intent.id);
        updated.payment_status = Some(PaymentStatus::Succeeded);
        updated.payment_method = intent.payment_method;
        updated.updated_at = self.clock.now();

        match self
            .orders
            .put_if_status(updated, OrderStatus::Pending)
            .await
        {
            Ok(()) => {}
            // A concurrent delivery of the same event won the write; it
            // will run the saga.
            Err(StoreError::ConditionFailed { .. }) => {
                return Ok(WebhookDisposition::Duplicate);
            }
            Err(err) => return Err(err.into()),
        }

        self.orchestrator.execute(order_id).await?;
        Ok(WebhookDisposition::SagaTriggered)
    }

    /// Cancels the order for a failed or canceled payment.
    async fn on_payment_terminal(
        &self,
        intent: PaymentIntentObject,
        payment_status: PaymentStatus,
    ) -> Result<WebhookDisposition, WebhookError> {
        let order_id = intent.order_id()?;
        let Some(order) = with_backoff("orders.get", || self.orders.get(order_id)).await? else {
            tracing::warn!(%order_id, "payment failure event for unknown order");
            return Ok(WebhookDisposition::Ignored);
        };

        if order.status.is_terminal() {
            return Ok(WebhookDisposition::Duplicate);
        }

        let observed = order.status;
        let mut updated = order;
        updated.payment_intent_id.get_or_insert(intent.id);
        updated.payment_status = Some(payment_status);
        updated.metadata.cancel_reason = Some(match payment_status {
            PaymentStatus::Canceled => "PAYMENT_CANCELED".to_string(),
            _ => "PAYMENT_FAILED".to_string(),
        });
        updated
            .transition(OrderStatus::Cancelled, self.clock.now())
            .map_err(SagaError::from)?;

        match self.orders.put_if_status(updated, observed).await {
            Ok(()) => Ok(WebhookDisposition::OrderCancelled),
            Err(StoreError::ConditionFailed { .. }) => Ok(WebhookDisposition::Duplicate),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    #[test]
    fn test_sign_and_verify_roundtrip() {
        let verifier = WebhookVerifier::new(Some(SECRET.to_string()), false);
        let payload = br#"{"type":"payment_intent.succeeded"}"#;
        let header = sign_payload(SECRET, 1_700_000_000, payload);

        assert!(verifier.verify(payload, &header).is_ok());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let verifier = WebhookVerifier::new(Some(SECRET.to_string()), false);
        let header = sign_payload(SECRET, 1_700_000_000, b"original");

        let err = verifier.verify(b"tampered", &header).unwrap_err();
        assert!(matches!(err, WebhookError::SignatureMismatch));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let verifier = WebhookVerifier::new(Some(SECRET.to_string()), false);
        let header = sign_payload("whsec_other", 1_700_000_000, b"body");

        let err = verifier.verify(b"body", &header).unwrap_err();
        assert!(matches!(err, WebhookError::SignatureMismatch));
    }

    #[test]
    fn test_malformed_header_rejected() {
        let verifier = WebhookVerifier::new(Some(SECRET.to_string()), false);
        for header in ["", "t=abc,v1=zz", "v1=00ff", "t=123"] {
            let err = verifier.verify(b"body", header).unwrap_err();
            assert!(matches!(err, WebhookError::MalformedSignature), "{header}");
        }
    }

    #[test]
    fn test_missing_secret_requires_dev_mode() {
        let strict = WebhookVerifier::new(None, false);
        assert!(matches!(
            strict.verify(b"body", "t=1,v1=00").unwrap_err(),
            WebhookError::MissingSecret
        ));

        let dev = WebhookVerifier::new(None, true);
        assert!(dev.verify(b"body", "whatever").is_ok());
    }

    #[test]
    fn test_event_decoding() {
        let order_id = OrderId::new();
        let body = serde_json::json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": { "object": {
                "id": "pi_1",
                "amount": 3998,
                "status": "succeeded",
                "payment_method": "card",
                "metadata": { "orderId": order_id.to_string() }
            }}
        });

        let event: PaymentEvent = serde_json::from_value(body).unwrap();
        assert_eq!(event.event_type, EVENT_PAYMENT_SUCCEEDED);
        assert_eq!(event.data.object.amount, 3998);
        assert_eq!(event.data.object.order_id().unwrap(), order_id);
    }

    #[test]
    fn test_event_missing_order_id() {
        let event: PaymentEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_1", "amount": 1, "status": "succeeded" } }
        }))
        .unwrap();

        assert!(matches!(
            event.data.object.order_id().unwrap_err(),
            WebhookError::MissingOrderId
        ));
    }
}
