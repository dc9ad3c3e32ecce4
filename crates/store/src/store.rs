use std::collections::HashMap;

use async_trait::async_trait;
use common::{OrderId, ProductId, TenantId, UserId};

use crate::model::{Order, OrderQuery, OrderStats, Product, StatusChange, User};
use crate::Result;

/// Outcome of a conditional stock decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// Stock was decremented by the requested quantity.
    Reserved { remaining: u32 },
    /// Stock was left untouched because fewer units were available.
    Insufficient { available: u32 },
}

/// An open atomic unit against the store.
///
/// Everything done through a transaction is invisible to other callers
/// until [`commit`](Transaction::commit). Dropping a transaction without
/// committing discards its writes.
#[async_trait]
pub trait Transaction: Send {
    /// Looks a product up within the tenant, active or not.
    async fn find_product(
        &mut self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Option<Product>>;

    /// Decrements stock by `quantity` if and only if at least that many
    /// units remain.
    ///
    /// Implementations must make the check and the decrement a single
    /// atomic step with respect to concurrent transactions.
    async fn reserve_stock(
        &mut self,
        tenant_id: TenantId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Reservation>;

    /// Inserts the order header and all of its lines.
    ///
    /// Fails with `DuplicateOrderNumber` if the tenant already has an order
    /// with the same number.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Makes every write of this transaction durable and visible.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discards every write of this transaction.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Core trait for order store implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Opens a new transaction.
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    /// Loads an order with its lines. Returns None outside the tenant.
    async fn get_order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Option<Order>>;

    /// Lists orders matching a query, newest first.
    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>>;

    /// Applies a compare-and-set status change.
    ///
    /// Returns the updated order, or None if no order in the tenant was in
    /// the expected status.
    async fn apply_status_change(&self, change: &StatusChange) -> Result<Option<Order>>;

    /// Loads a user within the tenant.
    async fn get_user(&self, tenant_id: TenantId, user_id: UserId) -> Result<Option<User>>;

    /// Display names of the given users within the tenant. Unknown ids are
    /// left out of the map.
    async fn user_names(
        &self,
        tenant_id: TenantId,
        user_ids: &[UserId],
    ) -> Result<HashMap<UserId, String>>;

    /// Aggregated order counters for a tenant.
    async fn order_stats(&self, tenant_id: TenantId) -> Result<OrderStats>;
}
