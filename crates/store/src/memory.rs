//! In-memory store implementations.
//!
//! These back the test suites and local runs. They hold data behind
//! `tokio::sync::RwLock` but expose exactly the conditional-write failure
//! surface of a real backend, so engine and saga logic exercised against
//! them behaves identically in production.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CustomerId, OrderId, ProductId, WarehouseId};
use domain::{Order, OrderStatus, Product};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::idempotency::{IdempotencyRecord, IdempotencyStore};
use crate::inventory::{InventoryLevel, InventoryStore};
use crate::orders::OrderStore;
use crate::products::ProductStore;
use crate::sessions::{SessionRecord, SessionStore};

/// In-memory order table with customer and status indexes.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of stored orders.
    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn put_new(&self, order: Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.order_id) {
            return Err(StoreError::AlreadyExists {
                entity: "order",
                key: order.order_id.to_string(),
            });
        }
        orders.insert(order.order_id, order);
        Ok(())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&order_id).cloned())
    }

    async fn put_if_status(&self, order: Order, expected: OrderStatus) -> Result<()> {
        let mut orders = self.orders.write().await;
        let current = orders.get(&order.order_id).ok_or(StoreError::NotFound {
            entity: "order",
            key: order.order_id.to_string(),
        })?;
        if current.status != expected {
            return Err(StoreError::ConditionFailed {
                entity: "order",
                key: order.order_id.to_string(),
            });
        }
        orders.insert(order.order_id, order);
        Ok(())
    }

    async fn list_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut matched: Vec<Order> = orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect();
        matched.sort_by_key(|o| o.created_at);
        Ok(matched)
    }

    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut matched: Vec<Order> = orders
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect();
        matched.sort_by_key(|o| o.created_at);
        Ok(matched)
    }
}

/// In-memory inventory table.
///
/// Rows live in a `Vec` so `list_for_product` preserves insertion order,
/// matching the deterministic iteration the warehouse-selection loop
/// relies on.
#[derive(Clone, Default)]
pub struct InMemoryInventoryStore {
    rows: Arc<RwLock<Vec<InventoryLevel>>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(level: &InventoryLevel) -> String {
        format!("{}@{}", level.product_id, level.warehouse_id)
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn get(
        &self,
        product_id: &ProductId,
        warehouse_id: &WarehouseId,
    ) -> Result<Option<InventoryLevel>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|r| &r.product_id == product_id && &r.warehouse_id == warehouse_id)
            .cloned())
    }

    async fn list_for_product(&self, product_id: &ProductId) -> Result<Vec<InventoryLevel>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| &r.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn put(&self, level: InventoryLevel) -> Result<()> {
        let mut rows = self.rows.write().await;
        match rows
            .iter_mut()
            .find(|r| r.product_id == level.product_id && r.warehouse_id == level.warehouse_id)
        {
            Some(existing) => *existing = level,
            None => rows.push(level),
        }
        Ok(())
    }

    async fn put_if_version(&self, level: InventoryLevel, expected_version: u64) -> Result<()> {
        let mut rows = self.rows.write().await;
        let existing = rows
            .iter_mut()
            .find(|r| r.product_id == level.product_id && r.warehouse_id == level.warehouse_id)
            .ok_or_else(|| StoreError::ConditionFailed {
                entity: "inventory",
                key: Self::key(&level),
            })?;
        if existing.version != expected_version {
            return Err(StoreError::ConditionFailed {
                entity: "inventory",
                key: Self::key(&level),
            });
        }
        *existing = level;
        Ok(())
    }
}

/// In-memory product catalog.
#[derive(Clone, Default)]
pub struct InMemoryProductStore {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn get(&self, product_id: &ProductId) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(product_id).cloned())
    }

    async fn put(&self, product: Product) -> Result<()> {
        self.products
            .write()
            .await
            .insert(product.product_id.clone(), product);
        Ok(())
    }
}

/// In-memory idempotency table.
#[derive(Clone, Default)]
pub struct InMemoryIdempotencyStore {
    records: Arc<RwLock<HashMap<String, IdempotencyRecord>>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn put_if_absent(&self, record: IdempotencyRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.key) {
            return Err(StoreError::AlreadyExists {
                entity: "idempotency-key",
                key: record.key.clone(),
            });
        }
        records.insert(record.key.clone(), record);
        Ok(())
    }

    async fn put(&self, record: IdempotencyRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.key.clone(), record);
        Ok(())
    }

    async fn purge_expired(&self, now_epoch: i64) -> Result<usize> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.expires_at > now_epoch);
        Ok(before - records.len())
    }
}

/// In-memory admin session table.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_token: &str) -> Result<Option<SessionRecord>> {
        Ok(self.sessions.read().await.get(session_token).cloned())
    }

    async fn put(&self, session: SessionRecord) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session.session_token.clone(), session);
        Ok(())
    }

    async fn purge_expired(&self, now_epoch: i64) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now_epoch);
        Ok(before - sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use common::Money;
    use domain::{OrderItem, ShippingAddress};

    use super::*;
    use crate::idempotency::IdempotencyStatus;

    fn test_order() -> Order {
        Order::new(
            CustomerId::new(),
            vec![OrderItem::new("P1", "Widget", 2, Money::from_cents(1999))],
            ShippingAddress {
                street: "1 Main St".into(),
                city: "Springfield".into(),
                state: "IL".into(),
                postal_code: "62701".into(),
                country: "US".into(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn level(product: &str, warehouse: &str, quantity: u32, version: u64) -> InventoryLevel {
        InventoryLevel {
            product_id: product.into(),
            warehouse_id: warehouse.into(),
            quantity,
            reserved: 0,
            version,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_put_new_rejects_duplicates() {
        let store = InMemoryOrderStore::new();
        let order = test_order();

        store.put_new(order.clone()).await.unwrap();
        let err = store.put_new(order).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_put_if_status_races() {
        let store = InMemoryOrderStore::new();
        let mut order = test_order();
        store.put_new(order.clone()).await.unwrap();

        // Writer A wins the Pending -> InventoryReserved race.
        order
            .transition(OrderStatus::InventoryReserved, Utc::now())
            .unwrap();
        store
            .put_if_status(order.clone(), OrderStatus::Pending)
            .await
            .unwrap();

        // Writer B raced on the same precondition and loses.
        let err = store
            .put_if_status(order.clone(), OrderStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConditionFailed { .. }));
    }

    #[tokio::test]
    async fn test_put_if_status_missing_order() {
        let store = InMemoryOrderStore::new();
        let err = store
            .put_if_status(test_order(), OrderStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_status_index_is_chronological() {
        let store = InMemoryOrderStore::new();
        let mut first = test_order();
        first.created_at = Utc::now() - Duration::minutes(10);
        let second = test_order();

        // Insert newest first to prove the index sorts.
        store.put_new(second.clone()).await.unwrap();
        store.put_new(first.clone()).await.unwrap();

        let pending = store.list_by_status(OrderStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].order_id, first.order_id);
        assert_eq!(pending[1].order_id, second.order_id);
    }

    #[tokio::test]
    async fn test_customer_index_filters() {
        let store = InMemoryOrderStore::new();
        let mine = test_order();
        let theirs = test_order();
        store.put_new(mine.clone()).await.unwrap();
        store.put_new(theirs).await.unwrap();

        let listed = store.list_by_customer(mine.customer_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].order_id, mine.order_id);
    }

    #[tokio::test]
    async fn test_inventory_put_if_version() {
        let store = InMemoryInventoryStore::new();
        store.put(level("P1", "W1", 100, 5)).await.unwrap();

        let mut updated = level("P1", "W1", 100, 6);
        updated.reserved = 2;
        store.put_if_version(updated, 5).await.unwrap();

        let row = store.get(&"P1".into(), &"W1".into()).await.unwrap().unwrap();
        assert_eq!(row.reserved, 2);
        assert_eq!(row.version, 6);

        // Stale writer loses.
        let err = store.put_if_version(level("P1", "W1", 100, 6), 5).await.unwrap_err();
        assert!(matches!(err, StoreError::ConditionFailed { .. }));
    }

    #[tokio::test]
    async fn test_inventory_put_if_version_missing_row() {
        let store = InMemoryInventoryStore::new();
        let err = store.put_if_version(level("P1", "W1", 1, 1), 0).await.unwrap_err();
        assert!(matches!(err, StoreError::ConditionFailed { .. }));
    }

    #[tokio::test]
    async fn test_inventory_listing_preserves_insertion_order() {
        let store = InMemoryInventoryStore::new();
        store.put(level("P1", "W1", 10, 1)).await.unwrap();
        store.put(level("P1", "W2", 20, 1)).await.unwrap();
        store.put(level("P2", "W1", 5, 1)).await.unwrap();
        store.put(level("P1", "W3", 30, 1)).await.unwrap();

        let rows = store.list_for_product(&"P1".into()).await.unwrap();
        let warehouses: Vec<&str> = rows.iter().map(|r| r.warehouse_id.as_str()).collect();
        assert_eq!(warehouses, ["W1", "W2", "W3"]);
    }

    #[tokio::test]
    async fn test_idempotency_put_if_absent() {
        let store = InMemoryIdempotencyStore::new();
        let record = IdempotencyRecord {
            key: "order:abc:payment-verification".into(),
            operation: "payment-verification".into(),
            status: IdempotencyStatus::InProgress,
            result: None,
            created_at: Utc::now(),
            expires_at: Utc::now().timestamp() + 3600,
        };

        store.put_if_absent(record.clone()).await.unwrap();
        let err = store.put_if_absent(record).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_idempotency_ttl_purge() {
        let store = InMemoryIdempotencyStore::new();
        let now = Utc::now().timestamp();
        for (key, expires_at) in [("old", now - 10), ("live", now + 3600)] {
            store
                .put(IdempotencyRecord {
                    key: key.into(),
                    operation: "op".into(),
                    status: IdempotencyStatus::Completed,
                    result: None,
                    created_at: Utc::now(),
                    expires_at,
                })
                .await
                .unwrap();
        }

        let purged = store.purge_expired(now).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.get("old").await.unwrap().is_none());
        assert!(store.get("live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_session_expiry() {
        let store = InMemorySessionStore::new();
        let now = Utc::now().timestamp();
        store
            .put(SessionRecord {
                session_token: "tok-1".into(),
                username: "admin".into(),
                created_at: Utc::now(),
                expires_at: now + 60,
            })
            .await
            .unwrap();

        let session = store.get("tok-1").await.unwrap().unwrap();
        assert!(session.is_valid_at(now));
        assert!(!session.is_valid_at(now + 120));

        let purged = store.purge_expired(now + 120).await.unwrap();
        assert_eq!(purged, 1);
    }
}
