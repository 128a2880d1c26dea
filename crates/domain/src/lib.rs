//! Domain model for the order fulfillment system.
//!
//! The order record, its status state machine, products, and the shared
//! payment/shipping vocabulary. Persistence lives in the `store` crate;
//! this crate only encodes shapes and invariants.

pub mod error;
pub mod order;
pub mod payment;
pub mod product;
pub mod shipping;

pub use error::OrderError;
pub use order::{Order, OrderItem, OrderMetadata, OrderStatus, ShippingAddress};
pub use payment::PaymentStatus;
pub use product::Product;
pub use shipping::Carrier;
