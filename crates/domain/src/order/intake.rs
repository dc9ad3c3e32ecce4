//! Order intake validation.
//!
//! Shape checks run before the store is touched. Catalog checks run inside
//! the order's transaction and never mutate anything.

use std::collections::HashMap;

use common::{Money, ProductId, TenantId};
use serde::{Deserialize, Serialize};
use store::{Product, Transaction};

use crate::error::OrderError;

/// One requested line of a new order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl LineRequest {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Request to place an order on behalf of the acting customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    #[serde(alias = "items")]
    pub lines: Vec<LineRequest>,
    pub delivery_address: String,
    pub payment_method: String,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PlaceOrder {
    pub fn new(
        lines: Vec<LineRequest>,
        delivery_address: impl Into<String>,
        payment_method: impl Into<String>,
    ) -> Self {
        Self {
            lines,
            delivery_address: delivery_address.into(),
            payment_method: payment_method.into(),
            payment_id: None,
            notes: None,
        }
    }

    pub fn with_payment_id(mut self, payment_id: impl Into<String>) -> Self {
        self.payment_id = Some(payment_id.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Rejects malformed requests before any store call.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.lines.is_empty() {
            return Err(OrderError::Validation(
                "Order must contain at least one item".to_string(),
            ));
        }
        if let Some(line) = self.lines.iter().find(|line| line.quantity == 0) {
            return Err(OrderError::Validation(format!(
                "Quantity for product {} must be greater than 0",
                line.product_id
            )));
        }
        if self.delivery_address.trim().is_empty() {
            return Err(OrderError::Validation(
                "Delivery address is required".to_string(),
            ));
        }
        if self.payment_method.trim().is_empty() {
            return Err(OrderError::Validation(
                "Payment method is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// A line checked against the catalog, carrying name and price snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
}

/// All lines of a request, validated, with their running subtotal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCart {
    pub lines: Vec<ValidatedLine>,
    pub subtotal: Money,
}

/// Checks every line against the tenant's catalog.
///
/// A product appearing on several lines must cover the cumulative quantity.
/// Fails on the first offending line in request order.
pub async fn validate_lines(
    tx: &mut dyn Transaction,
    tenant_id: TenantId,
    lines: &[LineRequest],
) -> Result<ValidatedCart, OrderError> {
    let mut products: HashMap<ProductId, Product> = HashMap::new();
    let mut requested: HashMap<ProductId, u32> = HashMap::new();
    let mut validated = Vec::with_capacity(lines.len());
    let mut subtotal = Money::zero();

    for line in lines {
        let product = match products.get(&line.product_id) {
            Some(product) => product.clone(),
            None => {
                let product = tx
                    .find_product(tenant_id, line.product_id)
                    .await?
                    .filter(|p| p.is_active)
                    .ok_or(OrderError::ProductUnavailable {
                        product_id: line.product_id,
                    })?;
                products.insert(line.product_id, product.clone());
                product
            }
        };

        let total_requested = requested.entry(line.product_id).or_insert(0);
        *total_requested = total_requested.saturating_add(line.quantity);
        if product.stock < *total_requested {
            return Err(OrderError::InsufficientStock {
                product_id: product.id,
                product_name: product.name,
                available: product.stock,
            });
        }

        let line_subtotal = product.price.checked_mul(line.quantity)?;
        subtotal = subtotal.checked_add(line_subtotal)?;
        validated.push(ValidatedLine {
            product_id: product.id,
            product_name: product.name,
            quantity: line.quantity,
            unit_price: product.price,
            subtotal: line_subtotal,
        });
    }

    Ok(ValidatedCart {
        lines: validated,
        subtotal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::{InMemoryStore, OrderStore};

    fn product(tenant_id: TenantId, price: i64, stock: u32, is_active: bool) -> Product {
        Product {
            id: ProductId::new(),
            tenant_id,
            name: "Jaggery".to_string(),
            price: Money::from_cents(price),
            stock,
            is_active,
        }
    }

    #[test]
    fn shape_checks() {
        let line = LineRequest::new(ProductId::new(), 1);
        assert!(PlaceOrder::new(vec![line], "addr", "cod").validate().is_ok());
        assert!(PlaceOrder::new(vec![], "addr", "cod").validate().is_err());
        assert!(PlaceOrder::new(vec![line], "   ", "cod").validate().is_err());
        assert!(PlaceOrder::new(vec![line], "addr", "").validate().is_err());
        let zero = LineRequest::new(ProductId::new(), 0);
        assert!(matches!(
            PlaceOrder::new(vec![line, zero], "addr", "cod").validate(),
            Err(OrderError::Validation(_))
        ));
    }

    #[test]
    fn request_accepts_items_alias() {
        let id = ProductId::new();
        let json = serde_json::json!({
            "items": [{"product_id": id, "quantity": 2}],
            "delivery_address": "7 Hill Road",
            "payment_method": "cod"
        });
        let request: PlaceOrder = serde_json::from_value(json).unwrap();
        assert_eq!(request.lines, vec![LineRequest::new(id, 2)]);
        assert_eq!(request.payment_id, None);
    }

    #[tokio::test]
    async fn computes_snapshots_and_subtotal() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let p = product(tenant, 100, 5, true);
        let q = product(tenant, 50, 1, true);
        store.insert_product(p.clone()).await;
        store.insert_product(q.clone()).await;

        let mut tx = store.begin().await.unwrap();
        let cart = validate_lines(
            tx.as_mut(),
            tenant,
            &[LineRequest::new(p.id, 2), LineRequest::new(q.id, 1)],
        )
        .await
        .unwrap();

        assert_eq!(cart.subtotal, Money::from_cents(250));
        assert_eq!(cart.lines[0].subtotal, Money::from_cents(200));
        assert_eq!(cart.lines[1].unit_price, Money::from_cents(50));
    }

    #[tokio::test]
    async fn inactive_and_foreign_products_are_unavailable() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let inactive = product(tenant, 100, 5, false);
        let foreign = product(TenantId::new(), 100, 5, true);
        store.insert_product(inactive.clone()).await;
        store.insert_product(foreign.clone()).await;

        let mut tx = store.begin().await.unwrap();
        for id in [inactive.id, foreign.id, ProductId::new()] {
            let err = validate_lines(tx.as_mut(), tenant, &[LineRequest::new(id, 1)])
                .await
                .unwrap_err();
            assert!(matches!(err, OrderError::ProductUnavailable { product_id } if product_id == id));
        }
    }

    #[tokio::test]
    async fn repeated_product_is_checked_cumulatively() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let p = product(tenant, 100, 3, true);
        store.insert_product(p.clone()).await;

        let mut tx = store.begin().await.unwrap();
        let err = validate_lines(
            tx.as_mut(),
            tenant,
            &[LineRequest::new(p.id, 2), LineRequest::new(p.id, 2)],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, OrderError::InsufficientStock { available: 3, .. }));
    }
}
