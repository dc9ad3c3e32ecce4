//! Inventory reservation inside the order's transaction.

use std::collections::BTreeMap;

use common::{ProductId, TenantId};
use store::{Reservation, Transaction};

use super::intake::ValidatedLine;
use crate::error::OrderError;

/// Decrements stock for every product on the order.
///
/// Quantities are merged per product and products are reserved in id order,
/// so concurrent orders over overlapping products lock rows in the same
/// order. Each decrement is conditional on enough stock remaining. The first
/// product that cannot be covered fails the whole reservation; the caller
/// must roll the transaction back so earlier decrements are discarded.
pub async fn reserve_lines(
    tx: &mut dyn Transaction,
    tenant_id: TenantId,
    lines: &[ValidatedLine],
) -> Result<(), OrderError> {
    for (product_id, (quantity, product_name)) in merge_by_product(lines) {
        match tx.reserve_stock(tenant_id, product_id, quantity).await? {
            Reservation::Reserved { remaining } => {
                tracing::debug!(%product_id, quantity, remaining, "Stock reserved");
            }
            Reservation::Insufficient { available } => {
                return Err(OrderError::InsufficientStock {
                    product_id,
                    product_name: product_name.to_string(),
                    available,
                });
            }
        }
    }
    Ok(())
}

fn merge_by_product(lines: &[ValidatedLine]) -> BTreeMap<ProductId, (u32, &str)> {
    let mut merged: BTreeMap<ProductId, (u32, &str)> = BTreeMap::new();
    for line in lines {
        let entry = merged
            .entry(line.product_id)
            .or_insert((0, line.product_name.as_str()));
        entry.0 = entry.0.saturating_add(line.quantity);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Money, ProductId};
    use store::{InMemoryStore, OrderStore, Product};

    fn line(product: &Product, quantity: u32) -> ValidatedLine {
        ValidatedLine {
            product_id: product.id,
            product_name: product.name.clone(),
            quantity,
            unit_price: product.price,
            subtotal: product.price.checked_mul(quantity).unwrap(),
        }
    }

    #[tokio::test]
    async fn repeated_product_is_reserved_as_one_quantity() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let p = Product {
            id: ProductId::new(),
            tenant_id: tenant,
            name: "Cardamom".to_string(),
            price: Money::from_cents(900),
            stock: 4,
            is_active: true,
        };
        store.insert_product(p.clone()).await;

        let mut tx = store.begin().await.unwrap();
        let err = reserve_lines(tx.as_mut(), tenant, &[line(&p, 3), line(&p, 3)])
            .await
            .unwrap_err();
        tx.rollback().await.unwrap();

        assert!(matches!(err, OrderError::InsufficientStock { available: 4, .. }));
        assert_eq!(store.product(p.id).await.unwrap().stock, 4);
    }

    /// Records reservation calls instead of touching stock.
    #[derive(Default)]
    struct CallLog {
        calls: Vec<(ProductId, u32)>,
    }

    #[async_trait::async_trait]
    impl Transaction for CallLog {
        async fn find_product(
            &mut self,
            _tenant_id: TenantId,
            _product_id: ProductId,
        ) -> store::Result<Option<Product>> {
            Ok(None)
        }

        async fn reserve_stock(
            &mut self,
            _tenant_id: TenantId,
            product_id: ProductId,
            quantity: u32,
        ) -> store::Result<Reservation> {
            self.calls.push((product_id, quantity));
            Ok(Reservation::Reserved { remaining: 0 })
        }

        async fn insert_order(&mut self, _order: &store::Order) -> store::Result<()> {
            Ok(())
        }

        async fn commit(self: Box<Self>) -> store::Result<()> {
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> store::Result<()> {
            Ok(())
        }
    }

    fn catalog_item(tenant_id: TenantId) -> Product {
        Product {
            id: ProductId::new(),
            tenant_id,
            name: "Saffron".to_string(),
            price: Money::from_cents(1500),
            stock: 100,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn products_are_reserved_once_each_in_id_order() {
        let tenant = TenantId::new();
        let a = catalog_item(tenant);
        let b = catalog_item(tenant);
        let (low, high) = if a.id < b.id { (&a, &b) } else { (&b, &a) };

        // Request order is the reverse of id order, with the low id repeated.
        let mut forward = CallLog::default();
        reserve_lines(
            &mut forward,
            tenant,
            &[line(high, 1), line(low, 2), line(low, 3)],
        )
        .await
        .unwrap();

        let mut reversed = CallLog::default();
        reserve_lines(&mut reversed, tenant, &[line(low, 5), line(high, 1)])
            .await
            .unwrap();

        assert_eq!(forward.calls, vec![(low.id, 5), (high.id, 1)]);
        assert_eq!(reversed.calls, forward.calls);
    }
}
