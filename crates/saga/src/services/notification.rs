//! Customer notification adapter.
//!
//! Delivery is fire-and-forget from the saga's point of view: the
//! orchestrator and reaper log failures and move on.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;
use domain::Order;

use crate::error::{Result, SagaError};

/// Kinds of customer email the system sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    OrderConfirmation,
    AbandonedCartReminder,
}

/// Templated email delivery.
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Sends the order confirmation (tracking number, carrier, ETA are
    /// read off the order record).
    async fn send_order_confirmation(&self, order: &Order) -> Result<()>;

    /// Sends a one-time abandoned-cart reminder with a resume link.
    async fn send_abandoned_cart_reminder(&self, order: &Order, resume_url: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    sent: Vec<(EmailKind, OrderId)>,
    fail_on_send: bool,
}

/// In-memory notification service for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationService {
    state: Arc<RwLock<InMemoryNotificationState>>,
}

impl InMemoryNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail all sends.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Returns the number of emails of `kind` sent for `order_id`.
    pub fn sent_count(&self, kind: EmailKind, order_id: OrderId) -> usize {
        self.state
            .read()
            .unwrap()
            .sent
            .iter()
            .filter(|(k, o)| *k == kind && *o == order_id)
            .count()
    }

    /// Returns the total number of emails sent.
    pub fn total_sent(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }

    fn record(&self, kind: EmailKind, order_id: OrderId) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_send {
            return Err(SagaError::Notification("delivery failed".to_string()));
        }
        state.sent.push((kind, order_id));
        Ok(())
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationService {
    async fn send_order_confirmation(&self, order: &Order) -> Result<()> {
        self.record(EmailKind::OrderConfirmation, order.order_id)
    }

    async fn send_abandoned_cart_reminder(&self, order: &Order, _resume_url: &str) -> Result<()> {
        self.record(EmailKind::AbandonedCartReminder, order.order_id)
    }
}

/// Notification service that only logs, for local runs without a mail
/// backend.
#[derive(Debug, Clone)]
pub struct TracingNotificationService {
    from_email: String,
}

impl TracingNotificationService {
    pub fn new(from_email: impl Into<String>) -> Self {
        Self {
            from_email: from_email.into(),
        }
    }
}

#[async_trait]
impl NotificationService for TracingNotificationService {
    async fn send_order_confirmation(&self, order: &Order) -> Result<()> {
        tracing::info!(
            order_id = %order.order_id,
            from = %self.from_email,
            tracking = order.tracking_number.as_deref().unwrap_or("-"),
            "order confirmation email"
        );
        Ok(())
    }

    async fn send_abandoned_cart_reminder(&self, order: &Order, resume_url: &str) -> Result<()> {
        tracing::info!(
            order_id = %order.order_id,
            from = %self.from_email,
            resume_url,
            "abandoned cart reminder email"
        );
        Ok(())
    }
}
