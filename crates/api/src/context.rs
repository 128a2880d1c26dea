//! Application context: every handler's collaborators in one bundle.
//!
//! No process-level globals: stores, the payment gateway, the saga
//! machinery and the clock are constructed once at startup and passed
//! down explicitly.

use std::sync::Arc;

use common::{Clock, SystemClock};
use inventory::InventoryEngine;
use saga::{
    CartReaper, IdempotencyService, InMemoryPaymentGateway, PaymentGateway, ReaperConfig,
    SagaOrchestrator, TracingNotificationService, WebhookIngress, WebhookVerifier,
};
use store::{
    InMemoryIdempotencyStore, InMemoryInventoryStore, InMemoryOrderStore, InMemoryProductStore,
    InMemorySessionStore, OrderStore, ProductStore, SessionStore,
};

use crate::config::Config;

/// Shared application state accessible from all handlers.
pub struct AppContext {
    pub orders: Arc<dyn OrderStore>,
    pub products: Arc<dyn ProductStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub engine: InventoryEngine,
    pub payment: Arc<dyn PaymentGateway>,
    pub orchestrator: SagaOrchestrator,
    pub ingress: WebhookIngress,
    pub clock: Arc<dyn Clock>,
}

/// A fully wired application over the in-memory stores, plus the
/// concrete handles tests and seed tooling need.
pub struct AppRuntime {
    pub context: Arc<AppContext>,
    pub reaper: CartReaper,
    pub orders: Arc<InMemoryOrderStore>,
    pub inventory: Arc<InMemoryInventoryStore>,
    pub products: Arc<InMemoryProductStore>,
    pub sessions: Arc<InMemorySessionStore>,
    pub idempotency: Arc<InMemoryIdempotencyStore>,
    pub gateway: InMemoryPaymentGateway,
}

impl AppRuntime {
    /// Wires the whole system from configuration.
    pub fn from_config(config: &Config) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let orders = Arc::new(InMemoryOrderStore::new());
        let inventory = Arc::new(InMemoryInventoryStore::new());
        let products = Arc::new(InMemoryProductStore::new());
        let sessions = Arc::new(InMemorySessionStore::new());
        let idempotency_store = Arc::new(InMemoryIdempotencyStore::new());
        let gateway = InMemoryPaymentGateway::new();

        let engine = InventoryEngine::new(inventory.clone(), clock.clone());
        let idempotency = IdempotencyService::new(idempotency_store.clone(), clock.clone())
            .with_ttl(chrono::Duration::hours(config.idempotency_ttl_hours));
        let notifications = Arc::new(TracingNotificationService::new(
            config.notification_from_email.clone(),
        ));

        let orchestrator = SagaOrchestrator::new(
            orders.clone(),
            engine.clone(),
            Arc::new(gateway.clone()),
            notifications.clone(),
            idempotency.clone(),
            clock.clone(),
        );

        let ingress = WebhookIngress::new(
            WebhookVerifier::new(
                config.payment_webhook_secret.clone(),
                config.webhook_allow_unverified,
            ),
            orders.clone(),
            orchestrator.clone(),
            clock.clone(),
        );

        let reaper = CartReaper::new(
            orders.clone(),
            engine.clone(),
            notifications,
            idempotency,
            clock.clone(),
            ReaperConfig {
                timeout: chrono::Duration::minutes(config.abandoned_cart_timeout_minutes),
                send_reminders: config.send_reminder_emails,
                frontend_url: config.frontend_url.clone(),
                ..ReaperConfig::default()
            },
        );

        let context = Arc::new(AppContext {
            orders: orders.clone(),
            products: products.clone(),
            sessions: sessions.clone(),
            engine,
            payment: Arc::new(gateway.clone()),
            orchestrator,
            ingress,
            clock,
        });

        Self {
            context,
            reaper,
            orders,
            inventory,
            products,
            sessions,
            idempotency: idempotency_store,
            gateway,
        }
    }
}
