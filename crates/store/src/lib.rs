//! Durable store abstraction for the fulfillment system.
//!
//! Five logical tables (orders, inventory, products, idempotency keys,
//! admin sessions), each behind a trait whose conditional-write methods
//! carry the whole concurrency story: workers coordinate exclusively
//! through `ConditionFailed` outcomes, never through in-process locks.
//!
//! The in-memory implementations in [`memory`] serve tests and local runs;
//! any backend with a conditional-write primitive can slot in behind the
//! same traits.

pub mod error;
pub mod idempotency;
pub mod inventory;
pub mod memory;
pub mod orders;
pub mod products;
pub mod retry;
pub mod sessions;

pub use error::{Result, StoreError};
pub use idempotency::{IdempotencyRecord, IdempotencyStatus, IdempotencyStore};
pub use inventory::{InventoryLevel, InventoryStore};
pub use memory::{
    InMemoryIdempotencyStore, InMemoryInventoryStore, InMemoryOrderStore, InMemoryProductStore,
    InMemorySessionStore,
};
pub use orders::OrderStore;
pub use products::ProductStore;
pub use retry::with_backoff;
pub use sessions::{SessionRecord, SessionStore};
