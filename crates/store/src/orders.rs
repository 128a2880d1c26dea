//! Order store contract.

use async_trait::async_trait;
use common::{CustomerId, OrderId};
use domain::{Order, OrderStatus};

use crate::error::Result;

/// Durable storage for orders.
///
/// Orders are keyed by `order_id` with two secondary indexes: by customer
/// and by status, both in chronological (`created_at`) order. Writers that
/// advance an order race through [`OrderStore::put_if_status`]: the stored
/// record is replaced only while its status still matches what the writer
/// observed, so two workers advancing the same order cannot both win.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a new order under a does-not-exist condition.
    ///
    /// Fails with `AlreadyExists` if the order ID is taken.
    async fn put_new(&self, order: Order) -> Result<()>;

    /// Reads an order by ID.
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Replaces the stored order if its current status equals `expected`.
    ///
    /// Fails with `NotFound` if the order does not exist and
    /// `ConditionFailed` if another writer got there first.
    async fn put_if_status(&self, order: Order, expected: OrderStatus) -> Result<()>;

    /// Lists a customer's orders, oldest first.
    async fn list_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>>;

    /// Lists orders in a given status, oldest first.
    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>>;
}
