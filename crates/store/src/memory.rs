use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{NotificationId, OrderId, ProductId, TenantId, UserId};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::model::{Order, OrderQuery, OrderStats, Product, StatusChange, User};
use crate::notification_log::{LogQuery, NotificationLog, NotificationRecord, NotificationStats};
use crate::store::{OrderStore, Reservation, Transaction};
use crate::{Result, StoreError};

#[derive(Debug, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    users: HashMap<UserId, User>,
    /// Insertion order doubles as the tie-breaker for equal timestamps.
    orders: Vec<Order>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_on_insert_order: AtomicBool,
    fail_on_record: AtomicBool,
}

/// In-memory store implementation for testing and database-less runs.
///
/// Transactions hold the table lock from `begin` until commit or rollback,
/// so order creations are fully serialized. Writes are staged inside the
/// transaction and only applied on commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    notifications: Arc<RwLock<Vec<NotificationRecord>>>,
    faults: Arc<Faults>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a catalog product.
    pub async fn insert_product(&self, product: Product) {
        self.tables.lock().await.products.insert(product.id, product);
    }

    /// Adds or replaces a user.
    pub async fn insert_user(&self, user: User) {
        self.tables.lock().await.users.insert(user.id, user);
    }

    /// Returns the committed state of a product.
    pub async fn product(&self, product_id: ProductId) -> Option<Product> {
        self.tables.lock().await.products.get(&product_id).cloned()
    }

    /// Returns the number of committed orders across all tenants.
    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    /// Returns the number of committed order lines across all tenants.
    pub async fn order_line_count(&self) -> usize {
        self.tables
            .lock()
            .await
            .orders
            .iter()
            .map(|o| o.lines.len())
            .sum()
    }

    /// Returns the number of notification records across all tenants.
    pub async fn notification_count(&self) -> usize {
        self.notifications.read().await.len()
    }

    /// Makes every subsequent `insert_order` fail until reset.
    pub fn set_fail_on_insert_order(&self, fail: bool) {
        self.faults.fail_on_insert_order.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent notification `record` fail until reset.
    pub fn set_fail_on_record(&self, fail: bool) {
        self.faults.fail_on_record.store(fail, Ordering::SeqCst);
    }
}

/// Transaction over the in-memory tables.
pub struct InMemoryTransaction {
    tables: OwnedMutexGuard<Tables>,
    staged_stock: HashMap<ProductId, u32>,
    staged_orders: Vec<Order>,
    fail_on_insert_order: bool,
}

impl InMemoryTransaction {
    fn current_stock(&self, product: &Product) -> u32 {
        self.staged_stock
            .get(&product.id)
            .copied()
            .unwrap_or(product.stock)
    }

    fn tenant_product(&self, tenant_id: TenantId, product_id: ProductId) -> Option<&Product> {
        self.tables
            .products
            .get(&product_id)
            .filter(|p| p.tenant_id == tenant_id)
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn find_product(
        &mut self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Option<Product>> {
        Ok(self.tenant_product(tenant_id, product_id).map(|p| {
            let mut product = p.clone();
            product.stock = self.current_stock(p);
            product
        }))
    }

    async fn reserve_stock(
        &mut self,
        tenant_id: TenantId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Reservation> {
        let Some(product) = self.tenant_product(tenant_id, product_id) else {
            return Ok(Reservation::Insufficient { available: 0 });
        };
        let available = self.current_stock(product);

        if available < quantity {
            return Ok(Reservation::Insufficient { available });
        }

        let remaining = available - quantity;
        self.staged_stock.insert(product_id, remaining);
        Ok(Reservation::Reserved { remaining })
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        if self.fail_on_insert_order {
            return Err(StoreError::Unavailable(
                "order insert rejected by fault injection".to_string(),
            ));
        }

        let taken = self
            .tables
            .orders
            .iter()
            .chain(self.staged_orders.iter())
            .any(|o| o.tenant_id == order.tenant_id && o.order_number == order.order_number);
        if taken {
            return Err(StoreError::DuplicateOrderNumber {
                order_number: order.order_number.clone(),
            });
        }

        self.staged_orders.push(order.clone());
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let staged_stock = std::mem::take(&mut self.staged_stock);
        for (product_id, stock) in staged_stock {
            if let Some(product) = self.tables.products.get_mut(&product_id) {
                product.stock = stock;
            }
        }
        let staged_orders = std::mem::take(&mut self.staged_orders);
        self.tables.orders.extend(staged_orders);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let tables = self.tables.clone().lock_owned().await;
        Ok(Box::new(InMemoryTransaction {
            tables,
            staged_stock: HashMap::new(),
            staged_orders: Vec::new(),
            fail_on_insert_order: self.faults.fail_on_insert_order.load(Ordering::SeqCst),
        }))
    }

    async fn get_order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Option<Order>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .orders
            .iter()
            .find(|o| o.id == order_id && o.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let tables = self.tables.lock().await;
        let mut orders: Vec<_> = tables
            .orders
            .iter()
            .rev()
            .filter(|o| o.tenant_id == query.tenant_id)
            .filter(|o| query.scope.admits(o))
            .filter(|o| query.status.is_none_or(|status| o.status == status))
            .cloned()
            .collect();

        // Stable sort keeps newest-inserted first among equal timestamps
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(orders
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn apply_status_change(&self, change: &StatusChange) -> Result<Option<Order>> {
        let mut tables = self.tables.lock().await;
        let Some(order) = tables.orders.iter_mut().find(|o| {
            o.id == change.order_id
                && o.tenant_id == change.tenant_id
                && o.status == change.expected
        }) else {
            return Ok(None);
        };

        order.status = change.new_status;
        order.updated_at = change.updated_at;
        if let Some(agent_id) = change.delivery_agent_id {
            order.delivery_agent_id = Some(agent_id);
        }
        if let Some(delivered_at) = change.delivered_at {
            order.delivered_at = Some(delivered_at);
        }
        Ok(Some(order.clone()))
    }

    async fn get_user(&self, tenant_id: TenantId, user_id: UserId) -> Result<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .get(&user_id)
            .filter(|u| u.tenant_id == tenant_id)
            .cloned())
    }

    async fn user_names(
        &self,
        tenant_id: TenantId,
        user_ids: &[UserId],
    ) -> Result<HashMap<UserId, String>> {
        let tables = self.tables.lock().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| tables.users.get(id))
            .filter(|u| u.tenant_id == tenant_id)
            .map(|u| (u.id, u.name.clone()))
            .collect())
    }

    async fn order_stats(&self, tenant_id: TenantId) -> Result<OrderStats> {
        let tables = self.tables.lock().await;
        let mut stats = OrderStats::default();
        for order in tables.orders.iter().filter(|o| o.tenant_id == tenant_id) {
            stats.count(order);
        }
        Ok(stats)
    }
}

#[async_trait]
impl NotificationLog for InMemoryStore {
    async fn record(&self, record: NotificationRecord) -> Result<()> {
        if self.faults.fail_on_record.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "notification log rejected by fault injection".to_string(),
            ));
        }
        self.notifications.write().await.push(record);
        Ok(())
    }

    async fn get(
        &self,
        tenant_id: TenantId,
        id: NotificationId,
    ) -> Result<Option<NotificationRecord>> {
        let records = self.notifications.read().await;
        Ok(records
            .iter()
            .find(|r| r.id == id && r.tenant_id == tenant_id)
            .cloned())
    }

    async fn list(&self, query: &LogQuery) -> Result<Vec<NotificationRecord>> {
        let records = self.notifications.read().await;
        let mut matching: Vec<_> = records
            .iter()
            .rev()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn count(&self, query: &LogQuery) -> Result<u64> {
        let records = self.notifications.read().await;
        Ok(records.iter().filter(|r| query.matches(r)).count() as u64)
    }

    async fn stats(&self, tenant_id: TenantId, since: DateTime<Utc>) -> Result<NotificationStats> {
        let mut stats = {
            let records = self.notifications.read().await;
            NotificationStats::tally(records.iter().filter(|r| r.tenant_id == tenant_id), since)
        };

        let tables = self.tables.lock().await;
        for recipient in &mut stats.top_recipients {
            if let Some(user) = tables
                .users
                .get(&recipient.user_id)
                .filter(|u| u.tenant_id == tenant_id)
            {
                recipient.name = Some(user.name.clone());
                recipient.email = Some(user.email.clone());
            }
        }
        Ok(stats)
    }

    async fn prune_older_than(&self, tenant_id: TenantId, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut records = self.notifications.write().await;
        let before = records.len();
        records.retain(|r| r.tenant_id != tenant_id || r.created_at >= cutoff);
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OrderLine, OrderScope};
    use crate::notification_log::NotificationKind;
    use common::{Money, OrderStatus, PaymentStatus, Role};

    fn product(tenant_id: TenantId, stock: u32) -> Product {
        Product {
            id: ProductId::new(),
            tenant_id,
            name: "Basmati Rice".to_string(),
            price: Money::from_cents(10000),
            stock,
            is_active: true,
        }
    }

    fn order(tenant_id: TenantId, number: &str, product: &Product) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(),
            tenant_id,
            order_number: number.to_string(),
            customer_id: UserId::new(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Paid,
            payment_method: "card".to_string(),
            payment_id: Some("pay_1".to_string()),
            total_amount: Money::from_cents(10000),
            delivery_charge: Money::zero(),
            delivery_address: "12 Lake Road".to_string(),
            notes: None,
            delivery_agent_id: None,
            created_at: now,
            updated_at: now,
            delivered_at: None,
            lines: vec![OrderLine {
                product_id: product.id,
                product_name: product.name.clone(),
                quantity: 1,
                unit_price: product.price,
                subtotal: product.price,
            }],
        }
    }

    #[tokio::test]
    async fn reserve_and_commit_decrements_stock() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let p = product(tenant, 5);
        store.insert_product(p.clone()).await;

        let mut tx = store.begin().await.unwrap();
        let result = tx.reserve_stock(tenant, p.id, 2).await.unwrap();
        assert_eq!(result, Reservation::Reserved { remaining: 3 });
        tx.commit().await.unwrap();

        assert_eq!(store.product(p.id).await.unwrap().stock, 3);
    }

    #[tokio::test]
    async fn rollback_discards_reservation_and_order() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let p = product(tenant, 5);
        store.insert_product(p.clone()).await;

        let mut tx = store.begin().await.unwrap();
        tx.reserve_stock(tenant, p.id, 5).await.unwrap();
        tx.insert_order(&order(tenant, "ORD1", &p)).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.product(p.id).await.unwrap().stock, 5);
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let p = product(tenant, 1);
        store.insert_product(p.clone()).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.reserve_stock(tenant, p.id, 1).await.unwrap();
        }

        assert_eq!(store.product(p.id).await.unwrap().stock, 1);
    }

    #[tokio::test]
    async fn reservation_sees_staged_stock() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let p = product(tenant, 3);
        store.insert_product(p.clone()).await;

        let mut tx = store.begin().await.unwrap();
        tx.reserve_stock(tenant, p.id, 2).await.unwrap();
        assert_eq!(tx.find_product(tenant, p.id).await.unwrap().unwrap().stock, 1);
        assert_eq!(
            tx.reserve_stock(tenant, p.id, 2).await.unwrap(),
            Reservation::Insufficient { available: 1 }
        );
    }

    #[tokio::test]
    async fn products_are_tenant_scoped() {
        let store = InMemoryStore::new();
        let p = product(TenantId::new(), 3);
        store.insert_product(p.clone()).await;

        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_product(TenantId::new(), p.id).await.unwrap().is_none());
        assert_eq!(
            tx.reserve_stock(TenantId::new(), p.id, 1).await.unwrap(),
            Reservation::Insufficient { available: 0 }
        );
    }

    #[tokio::test]
    async fn duplicate_order_number_is_rejected_within_tenant() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let p = product(tenant, 10);
        store.insert_product(p.clone()).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order(tenant, "ORD1", &p)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = tx.insert_order(&order(tenant, "ORD1", &p)).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateOrderNumber { .. }));

        // Another tenant may reuse the number
        tx.insert_order(&order(TenantId::new(), "ORD1", &p)).await.unwrap();
    }

    #[tokio::test]
    async fn status_change_is_compare_and_set() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let p = product(tenant, 10);
        let o = order(tenant, "ORD1", &p);

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&o).await.unwrap();
        tx.commit().await.unwrap();

        let change = StatusChange {
            tenant_id: tenant,
            order_id: o.id,
            expected: OrderStatus::Processing,
            new_status: OrderStatus::InTransit,
            delivery_agent_id: None,
            delivered_at: None,
            updated_at: Utc::now(),
        };
        assert!(store.apply_status_change(&change).await.unwrap().is_none());

        let change = StatusChange {
            expected: OrderStatus::Pending,
            ..change
        };
        let updated = store.apply_status_change(&change).await.unwrap().unwrap();
        assert_eq!(updated.status, OrderStatus::InTransit);
    }

    #[tokio::test]
    async fn list_orders_applies_scope_and_paging() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let p = product(tenant, 10);
        let mine = order(tenant, "ORD1", &p);
        let customer = mine.customer_id;

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&mine).await.unwrap();
        tx.insert_order(&order(tenant, "ORD2", &p)).await.unwrap();
        tx.insert_order(&order(tenant, "ORD3", &p)).await.unwrap();
        tx.insert_order(&order(TenantId::new(), "ORD4", &p)).await.unwrap();
        tx.commit().await.unwrap();

        let all = store
            .list_orders(&OrderQuery::new(tenant, OrderScope::Tenant))
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let own = store
            .list_orders(&OrderQuery::new(tenant, OrderScope::Customer(customer)))
            .await
            .unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].order_number, "ORD1");

        let page = store
            .list_orders(&OrderQuery::new(tenant, OrderScope::Tenant).page(2, 2))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn stats_count_statuses_and_paid_revenue() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let p = product(tenant, 10);
        let mut unpaid = order(tenant, "ORD2", &p);
        unpaid.payment_status = PaymentStatus::Pending;

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order(tenant, "ORD1", &p)).await.unwrap();
        tx.insert_order(&unpaid).await.unwrap();
        tx.commit().await.unwrap();

        let stats = store.order_stats(tenant).await.unwrap();
        assert_eq!(stats.total_orders, 2);
        assert_eq!(stats.pending_orders, 2);
        assert_eq!(stats.total_revenue, Money::from_cents(10000));
    }

    #[tokio::test]
    async fn users_are_tenant_scoped() {
        let store = InMemoryStore::new();
        let user = User {
            id: UserId::new(),
            tenant_id: TenantId::new(),
            name: "Ravi".to_string(),
            email: "ravi@example.com".to_string(),
            phone: None,
            role: Role::Customer,
        };
        store.insert_user(user.clone()).await;

        assert_eq!(store.get_user(user.tenant_id, user.id).await.unwrap(), Some(user.clone()));
        assert!(store.get_user(TenantId::new(), user.id).await.unwrap().is_none());

        let names = store
            .user_names(user.tenant_id, &[user.id, UserId::new()])
            .await
            .unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[&user.id], "Ravi");
        assert!(store.user_names(TenantId::new(), &[user.id]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn notification_log_records_lists_and_prunes() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let user = UserId::new();

        let mut old = NotificationRecord::new(
            tenant,
            user,
            NotificationKind::Welcome,
            "welcome",
            serde_json::json!({"email": null}),
        );
        old.created_at = Utc::now() - chrono::Duration::days(120);
        store.record(old.clone()).await.unwrap();
        store
            .record(NotificationRecord::new(
                tenant,
                user,
                NotificationKind::OrderConfirmation,
                "ORD1",
                serde_json::json!({}),
            ))
            .await
            .unwrap();

        let listed = store.list(&LogQuery::new(tenant)).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].reference, "ORD1");
        assert!(store.get(tenant, old.id).await.unwrap().is_some());
        assert!(store.get(TenantId::new(), old.id).await.unwrap().is_none());

        let pruned = store
            .prune_older_than(tenant, Utc::now() - chrono::Duration::days(90))
            .await
            .unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(store.notification_count().await, 1);
    }

    #[tokio::test]
    async fn log_counts_and_stats_name_known_recipients() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let known = User {
            id: UserId::new(),
            tenant_id: tenant,
            name: "Ravi".to_string(),
            email: "ravi@example.com".to_string(),
            phone: None,
            role: Role::Customer,
        };
        store.insert_user(known.clone()).await;
        let gone = UserId::new();

        for (user, kind) in [
            (known.id, NotificationKind::OrderConfirmation),
            (known.id, NotificationKind::OrderStatusUpdate),
            (gone, NotificationKind::Welcome),
        ] {
            store
                .record(NotificationRecord::new(tenant, user, kind, "ref", serde_json::json!({})))
                .await
                .unwrap();
        }
        store
            .record(NotificationRecord::new(
                TenantId::new(),
                known.id,
                NotificationKind::Welcome,
                "welcome",
                serde_json::json!({}),
            ))
            .await
            .unwrap();

        let query = LogQuery::new(tenant).user(known.id).page(1, 0);
        assert_eq!(store.list(&query).await.unwrap().len(), 1);
        assert_eq!(store.count(&query).await.unwrap(), 2);

        let stats = store
            .stats(tenant, Utc::now() - chrono::Duration::days(7))
            .await
            .unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.recent_activity.len(), 1);
        assert_eq!(stats.recent_activity[0].count, 3);
        assert_eq!(stats.top_recipients[0].user_id, known.id);
        assert_eq!(stats.top_recipients[0].name.as_deref(), Some("Ravi"));
        assert_eq!(stats.top_recipients[1].user_id, gone);
        assert_eq!(stats.top_recipients[1].name, None);
    }

    #[tokio::test]
    async fn record_fault_injection() {
        let store = InMemoryStore::new();
        store.set_fail_on_record(true);
        let result = store
            .record(NotificationRecord::new(
                TenantId::new(),
                UserId::new(),
                NotificationKind::Welcome,
                "welcome",
                serde_json::json!({}),
            ))
            .await;
        assert!(result.is_err());
        assert_eq!(store.notification_count().await, 0);
    }
}
