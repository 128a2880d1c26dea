//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::OrderError;
use inventory::InventoryError;
use saga::{SagaError, WebhookError};
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Input shape or value violates the schema (400).
    BadRequest(String),
    /// Addressed entity does not exist (404).
    NotFound(String),
    /// Duplicate operation or lost state race (409).
    Conflict(String),
    /// Missing or invalid admin session token (401).
    Unauthorized(String),
    /// Internal server error (500).
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::AlreadyExists { .. } | StoreError::ConditionFailed { .. } => {
                ApiError::Conflict(err.to_string())
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        match &err {
            InventoryError::Insufficient { .. } => ApiError::BadRequest(err.to_string()),
            InventoryError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match &err {
            OrderError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        match &err {
            SagaError::OrderNotFound(_) => ApiError::NotFound(err.to_string()),
            SagaError::OrderNotReady(_) | SagaError::ConcurrentInProgress { .. } => {
                ApiError::Conflict(err.to_string())
            }
            SagaError::Inventory(InventoryError::Insufficient { .. }) => {
                ApiError::BadRequest(err.to_string())
            }
            SagaError::Order(inner) => ApiError::from_order_ref(inner),
            SagaError::Store(inner) => ApiError::from_store_ref(inner, &err),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match &err {
            WebhookError::MalformedSignature
            | WebhookError::SignatureMismatch
            | WebhookError::Payload(_)
            | WebhookError::MissingOrderId
            | WebhookError::InvalidOrderId(_) => ApiError::BadRequest(err.to_string()),
            WebhookError::OrderNotFound(_) => ApiError::NotFound(err.to_string()),
            WebhookError::MissingSecret => ApiError::Internal(err.to_string()),
            WebhookError::Store(inner) => ApiError::from_store_ref(inner, &err),
            WebhookError::Saga(inner) => match inner {
                SagaError::OrderNotFound(_) => ApiError::NotFound(err.to_string()),
                _ => ApiError::Internal(err.to_string()),
            },
        }
    }
}

impl ApiError {
    fn from_order_ref(err: &OrderError) -> Self {
        match err {
            OrderError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            _ => ApiError::BadRequest(err.to_string()),
        }
    }

    fn from_store_ref(inner: &StoreError, outer: &dyn std::fmt::Display) -> Self {
        match inner {
            StoreError::NotFound { .. } => ApiError::NotFound(outer.to_string()),
            StoreError::AlreadyExists { .. } | StoreError::ConditionFailed { .. } => {
                ApiError::Conflict(outer.to_string())
            }
            _ => ApiError::Internal(outer.to_string()),
        }
    }
}
