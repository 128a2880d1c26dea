//! Payment provider adapter.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Money, OrderId};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SagaError};

/// Refund reason sent to the provider for compensation refunds.
pub const REFUND_REASON_REQUESTED_BY_CUSTOMER: &str = "requested_by_customer";

/// Provider-side state of a payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    Processing,
    Succeeded,
    Canceled,
}

impl PaymentIntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentIntentStatus::RequiresPaymentMethod => "requires_payment_method",
            PaymentIntentStatus::Processing => "processing",
            PaymentIntentStatus::Succeeded => "succeeded",
            PaymentIntentStatus::Canceled => "canceled",
        }
    }
}

/// A payment intent as returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: Money,
    pub status: PaymentIntentStatus,
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A completed refund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub payment_intent_id: String,
    pub reason: String,
}

/// Payment provider operations the fulfillment flow needs: minting
/// intents at order creation, reading them back for verification, and
/// issuing refunds during compensation.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a payment intent for an order. The order ID travels in the
    /// intent metadata so webhooks can route back to the order.
    async fn create_intent(&self, amount: Money, order_id: OrderId) -> Result<PaymentIntent>;

    /// Retrieves an intent by ID.
    async fn get_intent(&self, intent_id: &str) -> Result<PaymentIntent>;

    /// Refunds an intent in full.
    async fn refund(&self, intent_id: &str, reason: &str) -> Result<Refund>;
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    intents: HashMap<String, PaymentIntent>,
    refunds: Vec<Refund>,
    next_id: u32,
    fail_on_refund: bool,
}

/// In-memory payment gateway for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to fail refund calls.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state.write().unwrap().fail_on_refund = fail;
    }

    /// Marks an intent as succeeded, simulating the customer paying.
    pub fn complete_payment(&self, intent_id: &str, payment_method: &str) {
        let mut state = self.state.write().unwrap();
        if let Some(intent) = state.intents.get_mut(intent_id) {
            intent.status = PaymentIntentStatus::Succeeded;
            intent.payment_method = Some(payment_method.to_string());
        }
    }

    /// Overrides an intent's amount, simulating provider-side tampering
    /// or a stale intent.
    pub fn set_intent_amount(&self, intent_id: &str, amount: Money) {
        let mut state = self.state.write().unwrap();
        if let Some(intent) = state.intents.get_mut(intent_id) {
            intent.amount = amount;
        }
    }

    /// Returns the number of refunds issued.
    pub fn refund_count(&self) -> usize {
        self.state.read().unwrap().refunds.len()
    }

    /// Returns the refund issued against an intent, if any.
    pub fn refund_for(&self, intent_id: &str) -> Option<Refund> {
        self.state
            .read()
            .unwrap()
            .refunds
            .iter()
            .find(|r| r.payment_intent_id == intent_id)
            .cloned()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_intent(&self, amount: Money, order_id: OrderId) -> Result<PaymentIntent> {
        let mut state = self.state.write().unwrap();
        state.next_id += 1;
        let id = format!("pi_{:04}", state.next_id);
        let intent = PaymentIntent {
            id: id.clone(),
            amount,
            status: PaymentIntentStatus::RequiresPaymentMethod,
            client_secret: format!("{id}_secret"),
            payment_method: None,
            metadata: HashMap::from([("orderId".to_string(), order_id.to_string())]),
        };
        state.intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn get_intent(&self, intent_id: &str) -> Result<PaymentIntent> {
        self.state
            .read()
            .unwrap()
            .intents
            .get(intent_id)
            .cloned()
            .ok_or_else(|| SagaError::Payment(format!("no such payment intent: {intent_id}")))
    }

    async fn refund(&self, intent_id: &str, reason: &str) -> Result<Refund> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_refund {
            return Err(SagaError::Payment("refund declined".to_string()));
        }
        if !state.intents.contains_key(intent_id) {
            return Err(SagaError::Payment(format!(
                "no such payment intent: {intent_id}"
            )));
        }
        let refund = Refund {
            id: format!("re_{:04}", state.refunds.len() + 1),
            payment_intent_id: intent_id.to_string(),
            reason: reason.to_string(),
        };
        state.refunds.push(refund.clone());
        Ok(refund)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_retrieve_intent() {
        let gateway = InMemoryPaymentGateway::new();
        let order_id = OrderId::new();

        let intent = gateway
            .create_intent(Money::from_cents(3998), order_id)
            .await
            .unwrap();
        assert_eq!(intent.status, PaymentIntentStatus::RequiresPaymentMethod);
        assert_eq!(intent.metadata["orderId"], order_id.to_string());

        let fetched = gateway.get_intent(&intent.id).await.unwrap();
        assert_eq!(fetched, intent);
    }

    #[tokio::test]
    async fn test_complete_payment_marks_succeeded() {
        let gateway = InMemoryPaymentGateway::new();
        let intent = gateway
            .create_intent(Money::from_cents(100), OrderId::new())
            .await
            .unwrap();

        gateway.complete_payment(&intent.id, "card");
        let fetched = gateway.get_intent(&intent.id).await.unwrap();
        assert_eq!(fetched.status, PaymentIntentStatus::Succeeded);
        assert_eq!(fetched.payment_method.as_deref(), Some("card"));
    }

    #[tokio::test]
    async fn test_refund_records_reason() {
        let gateway = InMemoryPaymentGateway::new();
        let intent = gateway
            .create_intent(Money::from_cents(100), OrderId::new())
            .await
            .unwrap();

        let refund = gateway
            .refund(&intent.id, REFUND_REASON_REQUESTED_BY_CUSTOMER)
            .await
            .unwrap();
        assert_eq!(refund.reason, REFUND_REASON_REQUESTED_BY_CUSTOMER);
        assert_eq!(gateway.refund_count(), 1);
    }

    #[tokio::test]
    async fn test_refund_failure_injection() {
        let gateway = InMemoryPaymentGateway::new();
        let intent = gateway
            .create_intent(Money::from_cents(100), OrderId::new())
            .await
            .unwrap();

        gateway.set_fail_on_refund(true);
        let err = gateway.refund(&intent.id, "x").await.unwrap_err();
        assert!(matches!(err, SagaError::Payment(_)));
        assert_eq!(gateway.refund_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_intent_errors() {
        let gateway = InMemoryPaymentGateway::new();
        assert!(gateway.get_intent("pi_nope").await.is_err());
        assert!(gateway.refund("pi_nope", "x").await.is_err());
    }
}
