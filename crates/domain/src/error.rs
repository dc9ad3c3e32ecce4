//! Domain error types.

use common::{MoneyError, OrderId, ProductId};
use store::StoreError;
use thiserror::Error;

/// Coarse classification of an [`OrderError`], used for HTTP status codes and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    Conflict,
    InvalidStatus,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidStatus => "invalid_status",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Malformed or missing input, rejected before touching the store.
    #[error("{0}")]
    Validation(String),

    /// The entity does not exist or is outside the actor's scope.
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    /// Role or ownership does not permit the operation.
    #[error("{0}")]
    Forbidden(String),

    /// Not enough stock to cover the requested quantity.
    #[error("Insufficient stock for {product_name}. Available: {available}")]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        available: u32,
    },

    /// The product does not exist in the tenant or is inactive.
    #[error("Product {product_id} not found or unavailable")]
    ProductUnavailable { product_id: ProductId },

    /// The generated order number collided with an existing one.
    #[error("Order number {order_number} is already taken")]
    DuplicateOrderNumber { order_number: String },

    /// Another writer moved the order before this transition was applied.
    #[error("Order {order_id} changed status concurrently")]
    StatusChanged { order_id: OrderId },

    /// Pricing the cart overflowed the money range. Found inside the
    /// transaction, which is rolled back.
    #[error("Order total is out of range")]
    AmountOutOfRange,

    /// The requested status is unknown or not reachable from the current one.
    #[error("{0}")]
    InvalidStatus(String),

    /// The store failed.
    #[error("Store error: {0}")]
    Store(#[source] StoreError),
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::Validation(_) | OrderError::AmountOutOfRange => ErrorKind::Validation,
            OrderError::NotFound { .. } => ErrorKind::NotFound,
            OrderError::Forbidden(_) => ErrorKind::Forbidden,
            OrderError::InsufficientStock { .. }
            | OrderError::ProductUnavailable { .. }
            | OrderError::DuplicateOrderNumber { .. }
            | OrderError::StatusChanged { .. } => ErrorKind::Conflict,
            OrderError::InvalidStatus(_) => ErrorKind::InvalidStatus,
            OrderError::Store(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn order_not_found() -> Self {
        OrderError::NotFound { entity: "Order" }
    }
}

impl From<StoreError> for OrderError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateOrderNumber { order_number } => {
                OrderError::DuplicateOrderNumber { order_number }
            }
            other => OrderError::Store(other),
        }
    }
}

impl From<MoneyError> for OrderError {
    fn from(_: MoneyError) -> Self {
        OrderError::AmountOutOfRange
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_number_from_store_is_a_conflict() {
        let err: OrderError = StoreError::DuplicateOrderNumber {
            order_number: "ORD1".to_string(),
        }
        .into();
        assert!(matches!(err, OrderError::DuplicateOrderNumber { .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn other_store_failures_are_internal() {
        let err: OrderError = StoreError::Unavailable("down".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn money_overflow_has_its_own_variant() {
        let err: OrderError = common::MoneyError.into();
        assert!(matches!(err, OrderError::AmountOutOfRange));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn insufficient_stock_names_product_and_availability() {
        let err = OrderError::InsufficientStock {
            product_id: ProductId::new(),
            product_name: "Ghee".to_string(),
            available: 2,
        };
        assert_eq!(err.to_string(), "Insufficient stock for Ghee. Available: 2");
    }
}
