use thiserror::Error;

/// Errors surfaced by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional write failed: the stored record did not satisfy the
    /// caller's precondition (version mismatch, unexpected status, or a
    /// does-not-exist condition that found a record).
    #[error("Conditional write failed for {entity} {key}")]
    ConditionFailed { entity: &'static str, key: String },

    /// The addressed record does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A put-if-absent found an existing record.
    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: &'static str, key: String },

    /// The backend is shedding load; retry with backoff.
    #[error("Store throttled")]
    Throttled,

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true for errors that a backoff retry can absorb.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Throttled)
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
