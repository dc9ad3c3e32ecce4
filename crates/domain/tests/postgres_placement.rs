//! Order placement against PostgreSQL.
//!
//! Exercises row locking that the in-memory store cannot show, since it
//! serializes every transaction behind one mutex. Uses a shared container.
//! Run with:
//!
//! ```bash
//! cargo test -p domain --test postgres_placement -- --test-threads=1
//! ```

use std::sync::Arc;

use common::{ProductId, Role, TenantId, UserId};
use domain::{Actor, ErrorKind, LineRequest, OrderError, OrderService, PlaceOrder};
use serial_test::serial;
use sqlx::PgPool;
use store::PostgresStore;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_storefront_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_items, orders, products, users, notifications_log")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

async fn seed_customer(store: &PostgresStore, tenant: TenantId) -> Actor {
    let id = UserId::new();
    sqlx::query("INSERT INTO users (id, tenant_id, name, email, role) VALUES ($1, $2, $3, $4, $5)")
        .bind(id.as_uuid())
        .bind(tenant.as_uuid())
        .bind("Nisha")
        .bind("nisha@example.com")
        .bind(Role::Customer.as_str())
        .execute(store.pool())
        .await
        .unwrap();
    Actor::new(tenant, id, Role::Customer)
}

async fn seed_product(store: &PostgresStore, tenant: TenantId, name: &str, stock: i32) -> ProductId {
    let id = ProductId::new();
    sqlx::query(
        "INSERT INTO products (id, tenant_id, name, price, stock) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id.as_uuid())
    .bind(tenant.as_uuid())
    .bind(name)
    .bind(2500_i64)
    .bind(stock)
    .execute(store.pool())
    .await
    .unwrap();
    id
}

async fn stock_of(store: &PostgresStore, product: ProductId) -> i32 {
    sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
        .bind(product.as_uuid())
        .fetch_one(store.pool())
        .await
        .unwrap()
}

async fn order_count(store: &PostgresStore) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(store.pool())
        .await
        .unwrap()
}

fn cart(products: &[ProductId]) -> PlaceOrder {
    PlaceOrder::new(
        products.iter().map(|&id| LineRequest::new(id, 1)).collect(),
        "3 Market Street",
        "cod",
    )
}

/// Places one order per cart concurrently and returns every result.
async fn place_concurrently(
    service: Arc<OrderService<PostgresStore>>,
    customer: Actor,
    carts: Vec<PlaceOrder>,
) -> Vec<Result<domain::PlacedOrder, OrderError>> {
    let handles: Vec<_> = carts
        .into_iter()
        .map(|request| {
            let service = service.clone();
            tokio::spawn(async move { service.create_order(&customer, request).await })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn overlapping_orders_in_opposite_line_order_all_commit() {
    let store = get_test_store().await;
    let tenant = TenantId::new();
    let customer = seed_customer(&store, tenant).await;
    let a = seed_product(&store, tenant, "Atta", 1000).await;
    let b = seed_product(&store, tenant, "Besan", 1000).await;
    let service = Arc::new(OrderService::new(store.clone()));

    let carts = (0..30)
        .map(|i| if i % 2 == 0 { cart(&[a, b]) } else { cart(&[b, a]) })
        .collect();
    let results = place_concurrently(service, customer, carts).await;

    let failures: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    assert!(failures.is_empty(), "orders failed: {failures:?}");
    assert_eq!(order_count(&store).await, 30);
    assert_eq!(stock_of(&store, a).await, 970);
    assert_eq!(stock_of(&store, b).await, 970);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn last_units_of_two_products_go_to_exactly_one_order() {
    let store = get_test_store().await;
    let tenant = TenantId::new();
    let customer = seed_customer(&store, tenant).await;
    let a = seed_product(&store, tenant, "Atta", 1).await;
    let b = seed_product(&store, tenant, "Besan", 1).await;
    let service = Arc::new(OrderService::new(store.clone()));

    let results = place_concurrently(service, customer, vec![cart(&[a, b]), cart(&[b, a])]).await;

    let placed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(placed, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind(), ErrorKind::Conflict, "unexpected error: {err}");
    }
    assert_eq!(order_count(&store).await, 1);
    assert_eq!(stock_of(&store, a).await, 0);
    assert_eq!(stock_of(&store, b).await, 0);
}
