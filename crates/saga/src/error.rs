//! Saga error types.

use common::OrderId;
use domain::OrderError;
use inventory::InventoryError;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during saga execution and compensation.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Order is not in a status the requested step can act on.
    #[error("Order not ready: {0}")]
    OrderNotReady(String),

    /// The provider reported a non-succeeded intent or a wrong amount.
    #[error("Payment verification failed: {0}")]
    PaymentVerificationFailed(String),

    /// Payment provider call failed.
    #[error("Payment gateway error: {0}")]
    Payment(String),

    /// Notification delivery failed (never fatal to the saga).
    #[error("Notification error: {0}")]
    Notification(String),

    /// Another execution currently holds this idempotency key.
    #[error("Operation already in progress for key {key}")]
    ConcurrentInProgress { key: String },

    /// Inventory engine error.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Order state machine violation.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SagaError {
    /// Machine-readable kind tag, recorded as the cancel reason when this
    /// error fails a saga.
    pub fn kind(&self) -> &'static str {
        match self {
            SagaError::OrderNotFound(_) => "OrderNotFound",
            SagaError::OrderNotReady(_) => "OrderNotReady",
            SagaError::PaymentVerificationFailed(_) => "PaymentVerificationFailed",
            SagaError::Payment(_) => "ExternalServiceError",
            SagaError::Notification(_) => "NotificationFailure",
            SagaError::ConcurrentInProgress { .. } => "DuplicateOperation",
            SagaError::Inventory(InventoryError::Insufficient { .. }) => "InsufficientInventory",
            SagaError::Inventory(_) => "ConcurrencyConflict",
            SagaError::Order(_) => "InvalidTransition",
            SagaError::Store(_) => "ExternalServiceError",
            SagaError::Serialization(_) => "SerializationFailure",
        }
    }
}

/// Result type for saga operations.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_inventory_kind() {
        let err = SagaError::Inventory(InventoryError::Insufficient {
            product_id: "P1".into(),
            requested: 2,
        });
        assert_eq!(err.kind(), "InsufficientInventory");
    }

    #[test]
    fn test_payment_mismatch_kind() {
        let err = SagaError::PaymentVerificationFailed("amount mismatch".into());
        assert_eq!(err.kind(), "PaymentVerificationFailed");
    }
}
