//! Admin session store contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// An admin session token, validated by the authorizer in front of admin
/// endpoints. Issuance happens out-of-band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_token: String,
    pub username: String,
    pub created_at: DateTime<Utc>,

    /// Expiry in epoch seconds; rows past this instant are purged.
    pub expires_at: i64,
}

impl SessionRecord {
    /// Returns true if the session is still valid at `now_epoch`.
    pub fn is_valid_at(&self, now_epoch: i64) -> bool {
        self.expires_at > now_epoch
    }
}

/// Durable storage for admin sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Reads a session by token.
    async fn get(&self, session_token: &str) -> Result<Option<SessionRecord>>;

    /// Upserts a session.
    async fn put(&self, session: SessionRecord) -> Result<()>;

    /// Removes sessions whose `expires_at` is at or before `now_epoch`.
    async fn purge_expired(&self, now_epoch: i64) -> Result<usize>;
}
