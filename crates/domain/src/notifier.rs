//! Post-commit hook for order notifications.

use common::OrderStatus;
use store::{Order, User};

/// Receives committed order events.
///
/// Implementations must return promptly and must not fail: anything they
/// do happens outside the order's atomic unit and is invisible to the caller.
pub trait OrderNotifier: Send + Sync {
    /// An order was committed.
    fn order_placed(&self, order: Order, customer: User);

    /// An order moved to `status`.
    fn status_changed(&self, order: Order, customer: User, status: OrderStatus);
}

/// Notifier that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl OrderNotifier for NoopNotifier {
    fn order_placed(&self, _order: Order, _customer: User) {}

    fn status_changed(&self, _order: Order, _customer: User, _status: OrderStatus) {}
}
