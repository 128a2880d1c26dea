//! At-most-once execution of side-effectful operations.

use std::future::Future;
use std::sync::Arc;

use common::Clock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use store::{IdempotencyRecord, IdempotencyStatus, IdempotencyStore, StoreError};

use crate::error::{Result, SagaError};

/// Default record TTL: 7 days (must stay >= 24h so every retry and
/// webhook-replay window is covered).
pub const DEFAULT_TTL_HOURS: i64 = 7 * 24;

/// Gates arbitrary side-effectful closures by a stable key.
///
/// At most one execution per key ever completes. Correctness rests on the
/// store's conditional insert, not on any lock: concurrent callers with
/// the same key see either the cached result or
/// [`SagaError::ConcurrentInProgress`]. Failed attempts are retryable.
///
/// The guarded closure must be deterministic enough that its cached
/// result is acceptable to later callers.
#[derive(Clone)]
pub struct IdempotencyService {
    store: Arc<dyn IdempotencyStore>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
}

impl IdempotencyService {
    /// Creates a service with the default 7-day record TTL.
    pub fn new(store: Arc<dyn IdempotencyStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            ttl: chrono::Duration::hours(DEFAULT_TTL_HOURS),
        }
    }

    /// Overrides the record TTL.
    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Runs `f` at most once for `key`, caching its serialized result.
    ///
    /// 1. A COMPLETED record short-circuits to the cached result.
    /// 2. Otherwise an IN_PROGRESS record is inserted under a
    ///    does-not-exist condition; losing that insert means another
    ///    caller holds the key (`ConcurrentInProgress`) unless its
    ///    attempt already FAILED, in which case the retry proceeds.
    /// 3. On success the record advances to COMPLETED with the result;
    ///    on error it advances to FAILED and the error propagates.
    #[tracing::instrument(skip(self, f))]
    pub async fn execute_once<T, F, Fut>(&self, key: &str, operation: &str, f: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.store.get(key).await? {
            Some(existing) => match existing.status {
                IdempotencyStatus::Completed => return Self::cached(existing),
                IdempotencyStatus::InProgress => {
                    return Err(SagaError::ConcurrentInProgress {
                        key: key.to_string(),
                    });
                }
                IdempotencyStatus::Failed => {
                    // Prior attempt failed; reclaim the key for this retry.
                    self.store.put(self.record(key, operation, IdempotencyStatus::InProgress, None)).await?;
                }
            },
            None => {
                let insert = self
                    .store
                    .put_if_absent(self.record(key, operation, IdempotencyStatus::InProgress, None))
                    .await;
                match insert {
                    Ok(()) => {}
                    Err(StoreError::AlreadyExists { .. }) => {
                        // Lost the insert race; inspect the winner.
                        let existing =
                            self.store.get(key).await?.ok_or(StoreError::NotFound {
                                entity: "idempotency-key",
                                key: key.to_string(),
                            })?;
                        match existing.status {
                            IdempotencyStatus::Completed => return Self::cached(existing),
                            IdempotencyStatus::InProgress => {
                                return Err(SagaError::ConcurrentInProgress {
                                    key: key.to_string(),
                                });
                            }
                            IdempotencyStatus::Failed => {
                                self.store
                                    .put(self.record(key, operation, IdempotencyStatus::InProgress, None))
                                    .await?;
                            }
                        }
                    }
                    Err(other) => return Err(other.into()),
                }
            }
        }

        match f().await {
            Ok(value) => {
                let result = serde_json::to_value(&value)?;
                self.store
                    .put(self.record(key, operation, IdempotencyStatus::Completed, Some(result)))
                    .await?;
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(key, operation, error = %err, "guarded operation failed");
                self.store
                    .put(self.record(key, operation, IdempotencyStatus::Failed, None))
                    .await?;
                Err(err)
            }
        }
    }

    fn cached<T: DeserializeOwned>(record: IdempotencyRecord) -> Result<T> {
        let value = record.result.unwrap_or(serde_json::Value::Null);
        Ok(serde_json::from_value(value)?)
    }

    fn record(
        &self,
        key: &str,
        operation: &str,
        status: IdempotencyStatus,
        result: Option<serde_json::Value>,
    ) -> IdempotencyRecord {
        let now = self.clock.now();
        IdempotencyRecord {
            key: key.to_string(),
            operation: operation.to_string(),
            status,
            result,
            created_at: now,
            expires_at: (now + self.ttl).timestamp(),
        }
    }
}
