//! Backoff retry for throttled store calls.

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Base delay before the first retry.
pub const BASE_DELAY: Duration = Duration::from_millis(100);

/// Total attempts (initial call plus retries).
pub const MAX_ATTEMPTS: u32 = 3;

/// Runs `f`, retrying [`StoreError::Throttled`] with exponential backoff
/// (100 ms base, doubling) up to [`MAX_ATTEMPTS`] attempts. Every other
/// error is returned immediately.
pub async fn with_backoff<T, F, Fut>(operation: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 1;
    loop {
        match f().await {
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                let delay = BASE_DELAY * 2u32.pow(attempt - 1);
                tracing::debug!(operation, attempt, delay_ms = delay.as_millis() as u64, "store throttled, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
