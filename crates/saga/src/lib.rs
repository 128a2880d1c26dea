//! Order fulfillment saga.
//!
//! Drives an order through the fixed step sequence
//! reserve inventory → verify payment → allocate shipping → notify,
//! with compensating actions (refund, inventory release, cancellation)
//! when a step fails. Side-effectful steps are gated by idempotency keys
//! so crashed or replayed executions are safe; duplicate payment webhooks
//! are absorbed by the order-status gate in the ingress.
//!
//! The abandoned-cart reaper independently cancels orders whose payment
//! never arrived and returns their reserved stock.

pub mod compensation;
pub mod error;
pub mod idempotency;
pub mod orchestrator;
pub mod reaper;
pub mod services;
pub mod steps;
pub mod webhook;

pub use compensation::{CompensationHandler, CompensationOp, CompensationReport};
pub use error::SagaError;
pub use idempotency::IdempotencyService;
pub use orchestrator::{FulfillmentOutcome, PaymentOutput, SagaOrchestrator, ShippingOutput};
pub use reaper::{CANCEL_REASON_ABANDONED, CartReaper, ReaperConfig, ReaperSummary};
pub use services::notification::{
    EmailKind, InMemoryNotificationService, NotificationService, TracingNotificationService,
};
pub use services::payment::{
    InMemoryPaymentGateway, PaymentGateway, PaymentIntent, PaymentIntentStatus, Refund,
    REFUND_REASON_REQUESTED_BY_CUSTOMER,
};
pub use webhook::{
    PaymentEvent, WebhookDisposition, WebhookError, WebhookIngress, WebhookVerifier, sign_payload,
};
