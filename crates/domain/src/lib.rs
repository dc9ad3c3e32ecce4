//! Domain layer for the storefront order pipeline.
//!
//! This crate provides:
//! - Order intake validation, stock reservation and persistence as one atomic unit
//! - The role-gated order status state machine
//! - The `OrderNotifier` hook invoked after commits

pub mod actor;
pub mod error;
pub mod notifier;
pub mod order;

pub use actor::Actor;
pub use error::{ErrorKind, OrderError};
pub use notifier::{NoopNotifier, OrderNotifier};
pub use order::{
    LineRequest, OrderFilter, OrderNumberGenerator, OrderService, PlaceOrder, PlacedOrder,
    TimestampOrderNumbers, Transition,
};
