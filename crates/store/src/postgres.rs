use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, NotificationId, OrderId, PaymentStatus, ProductId, Role, TenantId, UserId};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

use crate::model::{
    Order, OrderLine, OrderQuery, OrderScope, OrderStats, Product, StatusChange, User,
};
use crate::notification_log::{
    DailyCount, KindCount, LogQuery, NotificationKind, NotificationLog, NotificationRecord,
    NotificationStats, RecipientCount, TOP_RECIPIENTS,
};
use crate::store::{OrderStore, Reservation, Transaction};
use crate::{Result, StoreError};

const ORDER_COLUMNS: &str = "id, tenant_id, order_number, customer_id, status, payment_status, \
     payment_method, payment_id, total_amount, delivery_charge, delivery_address, notes, \
     delivery_agent_id, created_at, updated_at, delivered_at";

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let payment_status: String = row.try_get("payment_status")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id")?),
            order_number: row.try_get("order_number")?,
            customer_id: UserId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            status: status.parse::<common::OrderStatus>().map_err(|e| corrupt("orders", e))?,
            payment_status: payment_status
                .parse::<PaymentStatus>()
                .map_err(|e| corrupt("orders", e))?,
            payment_method: row.try_get("payment_method")?,
            payment_id: row.try_get("payment_id")?,
            total_amount: Money::from_cents(row.try_get("total_amount")?),
            delivery_charge: Money::from_cents(row.try_get("delivery_charge")?),
            delivery_address: row.try_get("delivery_address")?,
            notes: row.try_get("notes")?,
            delivery_agent_id: row
                .try_get::<Option<Uuid>, _>("delivery_agent_id")?
                .map(UserId::from_uuid),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            delivered_at: row.try_get("delivered_at")?,
            lines: Vec::new(),
        })
    }

    fn row_to_line(row: &PgRow) -> Result<(Uuid, OrderLine)> {
        let quantity: i32 = row.try_get("quantity")?;

        Ok((
            row.try_get("order_id")?,
            OrderLine {
                product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
                product_name: row.try_get("product_name")?,
                quantity: u32::try_from(quantity).map_err(|e| corrupt("order_items", e))?,
                unit_price: Money::from_cents(row.try_get("price")?),
                subtotal: Money::from_cents(row.try_get("subtotal")?),
            },
        ))
    }

    fn row_to_record(row: PgRow) -> Result<NotificationRecord> {
        let kind: String = row.try_get("type")?;

        Ok(NotificationRecord {
            id: NotificationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            kind: kind.parse::<NotificationKind>()?,
            reference: row.try_get("reference")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }

    /// Appends the optional `LogQuery` filters after `tenant_id = $1`.
    /// Returns the last placeholder index used.
    fn push_log_filters(sql: &mut String, query: &LogQuery) -> usize {
        let mut param_count = 1;
        if query.kind.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND type = ${param_count}"));
        }
        if query.user_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND user_id = ${param_count}"));
        }
        param_count
    }

    fn bind_log_filters<'q>(
        sqlx_query: Query<'q, Postgres, PgArguments>,
        query: &LogQuery,
    ) -> Query<'q, Postgres, PgArguments> {
        let mut sqlx_query = sqlx_query.bind(query.tenant_id.as_uuid());
        if let Some(kind) = query.kind {
            sqlx_query = sqlx_query.bind(kind.as_str());
        }
        if let Some(user_id) = query.user_id {
            sqlx_query = sqlx_query.bind(user_id.as_uuid());
        }
        sqlx_query
    }

    /// Loads the lines of every order in one round trip and attaches them in position order.
    async fn attach_lines(&self, orders: &mut [Order]) -> Result<()> {
        if orders.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, product_name, quantity, price, subtotal
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for row in &rows {
            let (order_id, line) = Self::row_to_line(row)?;
            by_order.entry(order_id).or_default().push(line);
        }

        for order in orders.iter_mut() {
            order.lines = by_order.remove(&order.id.as_uuid()).unwrap_or_default();
        }
        Ok(())
    }
}

fn corrupt(table: &'static str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        table,
        reason: err.to_string(),
    }
}

fn to_i32(table: &'static str, value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|e| corrupt(table, e))
}

/// Transaction over a pooled PostgreSQL connection.
///
/// Dropping it without committing rolls the database transaction back.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn find_product(
        &mut self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, name, price, stock, is_active
            FROM products
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(|row| -> Result<Product> {
            let stock: i32 = row.try_get("stock")?;
            Ok(Product {
                id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
                tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id")?),
                name: row.try_get("name")?,
                price: Money::from_cents(row.try_get("price")?),
                stock: u32::try_from(stock).map_err(|e| corrupt("products", e))?,
                is_active: row.try_get("is_active")?,
            })
        })
        .transpose()
    }

    async fn reserve_stock(
        &mut self,
        tenant_id: TenantId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Reservation> {
        // Check and decrement must stay a single statement.
        let remaining: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = stock - $1, updated_at = NOW()
            WHERE id = $2 AND tenant_id = $3 AND stock >= $1
            RETURNING stock
            "#,
        )
        .bind(to_i32("products", quantity)?)
        .bind(product_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(remaining) = remaining {
            return Ok(Reservation::Reserved {
                remaining: u32::try_from(remaining).map_err(|e| corrupt("products", e))?,
            });
        }

        let available: Option<i32> =
            sqlx::query_scalar("SELECT stock FROM products WHERE id = $1 AND tenant_id = $2")
                .bind(product_id.as_uuid())
                .bind(tenant_id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await?;

        tracing::debug!(%product_id, quantity, ?available, "Stock reservation refused");
        Ok(Reservation::Insufficient {
            available: available
                .map(u32::try_from)
                .transpose()
                .map_err(|e| corrupt("products", e))?
                .unwrap_or(0),
        })
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, tenant_id, order_number, customer_id, status, payment_status,
                payment_method, payment_id, total_amount, delivery_charge, delivery_address, notes,
                delivery_agent_id, created_at, updated_at, delivered_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.tenant_id.as_uuid())
        .bind(&order.order_number)
        .bind(order.customer_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(&order.payment_method)
        .bind(&order.payment_id)
        .bind(order.total_amount.cents())
        .bind(order.delivery_charge.cents())
        .bind(&order.delivery_address)
        .bind(&order.notes)
        .bind(order.delivery_agent_id.map(|id| id.as_uuid()))
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.delivered_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_tenant_order_number")
            {
                return StoreError::DuplicateOrderNumber {
                    order_number: order.order_number.clone(),
                };
            }
            StoreError::Database(e)
        })?;

        for (position, line) in order.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, position, product_id, product_name, quantity, price, subtotal)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(position as i32)
            .bind(line.product_id.as_uuid())
            .bind(&line.product_name)
            .bind(to_i32("order_items", line.quantity)?)
            .bind(line.unit_price.cents())
            .bind(line.subtotal.cents())
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let PostgresTransaction { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let PostgresTransaction { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn get_order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND tenant_id = $2");
        let row = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .bind(tenant_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut orders = vec![Self::row_to_order(&row)?];
        self.attach_lines(&mut orders).await?;
        Ok(orders.pop())
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE tenant_id = $1");
        let mut param_count = 1;

        // Build dynamic query
        match query.scope {
            OrderScope::Tenant => {}
            OrderScope::Customer(_) => {
                param_count += 1;
                sql.push_str(&format!(" AND customer_id = ${param_count}"));
            }
            OrderScope::Delivery(_) => {
                param_count += 1;
                sql.push_str(&format!(
                    " AND (delivery_agent_id = ${param_count} OR status IN ('pending', 'processing'))"
                ));
            }
        }
        if query.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${param_count}"));
        }

        sql.push_str(" ORDER BY created_at DESC, id DESC");
        sql.push_str(&format!(
            " LIMIT ${} OFFSET ${}",
            param_count + 1,
            param_count + 2
        ));

        let mut sqlx_query = sqlx::query(&sql).bind(query.tenant_id.as_uuid());
        match query.scope {
            OrderScope::Tenant => {}
            OrderScope::Customer(user_id) | OrderScope::Delivery(user_id) => {
                sqlx_query = sqlx_query.bind(user_id.as_uuid());
            }
        }
        if let Some(status) = query.status {
            sqlx_query = sqlx_query.bind(status.as_str());
        }
        sqlx_query = sqlx_query
            .bind(query.limit as i64)
            .bind(query.offset as i64);

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        let mut orders = rows
            .iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;
        self.attach_lines(&mut orders).await?;
        Ok(orders)
    }

    async fn apply_status_change(&self, change: &StatusChange) -> Result<Option<Order>> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $1,
                updated_at = $2,
                delivery_agent_id = COALESCE($3, delivery_agent_id),
                delivered_at = COALESCE($4, delivered_at)
            WHERE id = $5 AND tenant_id = $6 AND status = $7
            "#,
        )
        .bind(change.new_status.as_str())
        .bind(change.updated_at)
        .bind(change.delivery_agent_id.map(|id| id.as_uuid()))
        .bind(change.delivered_at)
        .bind(change.order_id.as_uuid())
        .bind(change.tenant_id.as_uuid())
        .bind(change.expected.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_order(change.tenant_id, change.order_id).await
    }

    async fn get_user(&self, tenant_id: TenantId, user_id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, name, email, phone, role
            FROM users
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<User> {
            let role: String = row.try_get("role")?;
            Ok(User {
                id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
                tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id")?),
                name: row.try_get("name")?,
                email: row.try_get("email")?,
                phone: row.try_get("phone")?,
                role: role.parse::<Role>().map_err(|e| corrupt("users", e))?,
            })
        })
        .transpose()
    }

    async fn user_names(
        &self,
        tenant_id: TenantId,
        user_ids: &[UserId],
    ) -> Result<HashMap<UserId, String>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<Uuid> = user_ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query("SELECT id, name FROM users WHERE tenant_id = $1 AND id = ANY($2)")
            .bind(tenant_id.as_uuid())
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<(UserId, String)> {
                Ok((
                    UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
                    row.try_get("name")?,
                ))
            })
            .collect()
    }

    async fn order_stats(&self, tenant_id: TenantId) -> Result<OrderStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_orders,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending_orders,
                COUNT(*) FILTER (WHERE status = 'processing') AS processing_orders,
                COUNT(*) FILTER (WHERE status = 'in-transit') AS in_transit_orders,
                COUNT(*) FILTER (WHERE status = 'delivered') AS delivered_orders,
                COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled_orders,
                COALESCE(SUM(total_amount) FILTER (WHERE payment_status = 'paid'), 0)::BIGINT AS total_revenue
            FROM orders
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        let count = |column: &str| count_column(&row, column);

        Ok(OrderStats {
            total_orders: count("total_orders")?,
            pending_orders: count("pending_orders")?,
            processing_orders: count("processing_orders")?,
            in_transit_orders: count("in_transit_orders")?,
            delivered_orders: count("delivered_orders")?,
            cancelled_orders: count("cancelled_orders")?,
            total_revenue: Money::from_cents(row.try_get("total_revenue")?),
        })
    }
}

#[async_trait]
impl NotificationLog for PostgresStore {
    async fn record(&self, record: NotificationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications_log (id, tenant_id, user_id, type, reference, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.tenant_id.as_uuid())
        .bind(record.user_id.as_uuid())
        .bind(record.kind.as_str())
        .bind(&record.reference)
        .bind(&record.metadata)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(
        &self,
        tenant_id: TenantId,
        id: NotificationId,
    ) -> Result<Option<NotificationRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, user_id, type, reference, metadata, created_at
            FROM notifications_log
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn list(&self, query: &LogQuery) -> Result<Vec<NotificationRecord>> {
        let mut sql = String::from(
            "SELECT id, tenant_id, user_id, type, reference, metadata, created_at FROM notifications_log WHERE tenant_id = $1",
        );
        let param_count = Self::push_log_filters(&mut sql, query);

        sql.push_str(" ORDER BY created_at DESC");
        sql.push_str(&format!(
            " LIMIT ${} OFFSET ${}",
            param_count + 1,
            param_count + 2
        ));

        let rows = Self::bind_log_filters(sqlx::query(&sql), query)
            .bind(query.limit as i64)
            .bind(query.offset as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn count(&self, query: &LogQuery) -> Result<u64> {
        let mut sql =
            String::from("SELECT COUNT(*) AS total FROM notifications_log WHERE tenant_id = $1");
        Self::push_log_filters(&mut sql, query);

        let row = Self::bind_log_filters(sqlx::query(&sql), query)
            .fetch_one(&self.pool)
            .await?;
        count_column(&row, "total")
    }

    async fn stats(&self, tenant_id: TenantId, since: DateTime<Utc>) -> Result<NotificationStats> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications_log WHERE tenant_id = $1")
                .bind(tenant_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;

        let kind_rows = sqlx::query(
            r#"
            SELECT type, COUNT(*) AS count
            FROM notifications_log
            WHERE tenant_id = $1
            GROUP BY type
            ORDER BY count DESC, type
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let day_rows = sqlx::query(
            r#"
            SELECT (created_at AT TIME ZONE 'UTC')::date AS day, COUNT(*) AS count
            FROM notifications_log
            WHERE tenant_id = $1 AND created_at >= $2
            GROUP BY day
            ORDER BY day DESC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let recipient_rows = sqlx::query(
            r#"
            SELECT n.user_id, u.name, u.email, COUNT(*) AS count
            FROM notifications_log n
            LEFT JOIN users u ON u.id = n.user_id AND u.tenant_id = n.tenant_id
            WHERE n.tenant_id = $1
            GROUP BY n.user_id, u.name, u.email
            ORDER BY count DESC, n.user_id
            LIMIT $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(TOP_RECIPIENTS as i64)
        .fetch_all(&self.pool)
        .await?;

        let by_kind = kind_rows
            .iter()
            .map(|row| -> Result<KindCount> {
                let kind: String = row.try_get("type")?;
                Ok(KindCount {
                    kind: kind.parse()?,
                    count: count_column(row, "count")?,
                })
            })
            .collect::<Result<_>>()?;

        let recent_activity = day_rows
            .iter()
            .map(|row| -> Result<DailyCount> {
                Ok(DailyCount {
                    date: row.try_get("day")?,
                    count: count_column(row, "count")?,
                })
            })
            .collect::<Result<_>>()?;

        let top_recipients = recipient_rows
            .iter()
            .map(|row| -> Result<RecipientCount> {
                Ok(RecipientCount {
                    user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
                    name: row.try_get("name")?,
                    email: row.try_get("email")?,
                    count: count_column(row, "count")?,
                })
            })
            .collect::<Result<_>>()?;

        Ok(NotificationStats {
            total: total.max(0) as u64,
            by_kind,
            recent_activity,
            top_recipients,
        })
    }

    async fn prune_older_than(&self, tenant_id: TenantId, cutoff: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM notifications_log WHERE tenant_id = $1 AND created_at < $2")
                .bind(tenant_id.as_uuid())
                .bind(cutoff)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}

fn count_column(row: &PgRow, column: &str) -> Result<u64> {
    let value: i64 = row.try_get(column)?;
    Ok(value.max(0) as u64)
}
