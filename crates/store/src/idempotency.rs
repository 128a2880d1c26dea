//! Idempotency key store contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Lifecycle of an idempotency record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdempotencyStatus {
    /// An execution holds the key; concurrent callers must back off.
    InProgress,

    /// The operation completed; `result` carries its cached output.
    Completed,

    /// The last attempt failed; the key may be retried.
    Failed,
}

/// One row in the idempotency table.
///
/// Rows expire via the store's TTL on `expires_at` (epoch seconds);
/// the TTL is at least 24 hours so that any webhook replay or saga retry
/// window is comfortably covered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// Opaque key, e.g. `order:{orderId}:payment-verification`.
    pub key: String,

    /// Label of the guarded operation, for diagnostics.
    pub operation: String,

    pub status: IdempotencyStatus,

    /// Serialized result of a completed execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,

    /// Expiry in epoch seconds; rows past this instant are purged.
    pub expires_at: i64,
}

/// Durable storage for idempotency keys.
///
/// `put_if_absent` is the serialization point: at most one live execution
/// per key, enforced by the store's does-not-exist condition rather than
/// any distributed lock.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Reads a record by key.
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>>;

    /// Inserts a record under a does-not-exist condition.
    ///
    /// Fails with `AlreadyExists` if the key is present.
    async fn put_if_absent(&self, record: IdempotencyRecord) -> Result<()>;

    /// Overwrites an existing record (status/result advancement).
    async fn put(&self, record: IdempotencyRecord) -> Result<()>;

    /// Removes records whose `expires_at` is at or before `now_epoch`.
    ///
    /// Stand-in for store-native TTL; returns the number of rows purged.
    async fn purge_expired(&self, now_epoch: i64) -> Result<usize>;
}
