//! Multi-warehouse inventory engine.
//!
//! Reservation, release, shipment confirmation and restocking over
//! versioned inventory rows. Optimistic locking is the only concurrency
//! control: every mutation names the version it read, and the store's
//! conditional write rejects stale writers. Retries absorb contention on
//! hot SKUs; trying every warehouse in turn is the anti-oversell
//! insurance.

pub mod engine;
pub mod error;

pub use engine::InventoryEngine;
pub use error::InventoryError;
