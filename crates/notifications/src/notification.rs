//! What gets dispatched.

use common::OrderStatus;
use store::{NotificationKind, Order, User};

/// One logical notification, fanned out across every channel.
#[derive(Debug, Clone)]
pub enum Notification {
    Welcome {
        user: User,
    },
    OrderConfirmation {
        order: Order,
        user: User,
    },
    StatusUpdate {
        order: Order,
        user: User,
        status: OrderStatus,
    },
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::Welcome { .. } => NotificationKind::Welcome,
            Notification::OrderConfirmation { .. } => NotificationKind::OrderConfirmation,
            Notification::StatusUpdate { .. } => NotificationKind::OrderStatusUpdate,
        }
    }

    /// The recipient.
    pub fn user(&self) -> &User {
        match self {
            Notification::Welcome { user }
            | Notification::OrderConfirmation { user, .. }
            | Notification::StatusUpdate { user, .. } => user,
        }
    }

    /// Log reference: the order number, or `welcome`.
    pub fn reference(&self) -> &str {
        match self {
            Notification::Welcome { .. } => "welcome",
            Notification::OrderConfirmation { order, .. }
            | Notification::StatusUpdate { order, .. } => &order.order_number,
        }
    }

    pub fn status(&self) -> Option<OrderStatus> {
        match self {
            Notification::StatusUpdate { status, .. } => Some(*status),
            _ => None,
        }
    }
}
