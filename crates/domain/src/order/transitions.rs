//! Role-gated order status transitions.
//!
//! | role          | permitted                                                 |
//! |---------------|-----------------------------------------------------------|
//! | admin, staff  | any forward move; cancel from pending or processing       |
//! | delivery      | forward moves to in-transit or delivered                  |
//! | customer      | own order, pending to cancelled only                      |

use common::{OrderStatus, Role, UserId};
use store::Order;

use crate::actor::Actor;
use crate::error::OrderError;

/// A permitted transition and the side effects that go with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: OrderStatus,
    pub to: OrderStatus,
    /// Delivery agent to bind to the order.
    pub bind_agent: Option<UserId>,
    /// Whether `delivered_at` must be stamped.
    pub stamp_delivered: bool,
}

/// Parses a requested status name.
pub fn parse_status(requested: &str) -> Result<OrderStatus, OrderError> {
    requested
        .trim()
        .parse::<OrderStatus>()
        .map_err(|_| OrderError::InvalidStatus(format!("Invalid status: {requested}")))
}

/// Decides whether `actor` may move `order` to `to`.
///
/// Visibility is checked by the caller; this only applies the role table.
pub fn plan(actor: &Actor, order: &Order, to: OrderStatus) -> Result<Transition, OrderError> {
    let from = order.status;
    if from == to {
        return Err(OrderError::InvalidStatus(format!("Order is already {from}")));
    }

    match actor.role {
        Role::Admin | Role::Staff => {
            if from.is_terminal() {
                return Err(OrderError::InvalidStatus(format!(
                    "Order is {from} and can no longer change"
                )));
            }
            let reachable = if to == OrderStatus::Cancelled {
                from.can_cancel()
            } else {
                from.is_forward_to(to)
            };
            if !reachable {
                return Err(not_reachable(from, to));
            }
        }
        Role::Delivery => {
            if !matches!(to, OrderStatus::InTransit | OrderStatus::Delivered) {
                return Err(OrderError::Forbidden(
                    "Delivery agents can only mark orders in-transit or delivered".to_string(),
                ));
            }
            if !from.is_forward_to(to) {
                return Err(not_reachable(from, to));
            }
        }
        Role::Customer => {
            if order.customer_id != actor.user_id {
                return Err(OrderError::Forbidden(
                    "Customers can only update their own orders".to_string(),
                ));
            }
            if to != OrderStatus::Cancelled || from != OrderStatus::Pending {
                return Err(OrderError::Forbidden(
                    "Customers can only cancel pending orders".to_string(),
                ));
            }
        }
    }

    Ok(Transition {
        from,
        to,
        bind_agent: (actor.role == Role::Delivery && to == OrderStatus::InTransit)
            .then_some(actor.user_id),
        stamp_delivered: to == OrderStatus::Delivered,
    })
}

fn not_reachable(from: OrderStatus, to: OrderStatus) -> OrderError {
    OrderError::InvalidStatus(format!("Cannot move order from {from} to {to}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{Money, OrderId, PaymentStatus, TenantId};

    fn order_in(status: OrderStatus, customer_id: UserId) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(),
            tenant_id: TenantId::new(),
            order_number: "ORD1".to_string(),
            customer_id,
            status,
            payment_status: PaymentStatus::Pending,
            payment_method: "cod".to_string(),
            payment_id: None,
            total_amount: Money::zero(),
            delivery_charge: Money::zero(),
            delivery_address: "1 Fort Road".to_string(),
            notes: None,
            delivery_agent_id: None,
            created_at: now,
            updated_at: now,
            delivered_at: None,
            lines: Vec::new(),
        }
    }

    fn actor(role: Role) -> Actor {
        Actor::new(TenantId::new(), UserId::new(), role)
    }

    #[test]
    fn parse_rejects_unknown_names() {
        assert_eq!(parse_status("in-transit").unwrap(), OrderStatus::InTransit);
        assert!(matches!(
            parse_status("shipped"),
            Err(OrderError::InvalidStatus(_))
        ));
    }

    #[test]
    fn staff_moves_forward_and_cancels_open_orders() {
        let staff = actor(Role::Staff);
        let order = order_in(OrderStatus::Pending, UserId::new());
        assert!(plan(&staff, &order, OrderStatus::Delivered).is_ok());
        assert!(plan(&staff, &order, OrderStatus::Cancelled).is_ok());

        let shipped = order_in(OrderStatus::InTransit, UserId::new());
        assert!(matches!(
            plan(&staff, &shipped, OrderStatus::Cancelled),
            Err(OrderError::InvalidStatus(_))
        ));
        assert!(matches!(
            plan(&staff, &shipped, OrderStatus::Processing),
            Err(OrderError::InvalidStatus(_))
        ));
    }

    #[test]
    fn finished_orders_accept_no_staff_transition() {
        let admin = actor(Role::Admin);
        for from in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            let order = order_in(from, UserId::new());
            for to in OrderStatus::ALL.into_iter().filter(|to| *to != from) {
                let err = plan(&admin, &order, to).unwrap_err();
                assert!(
                    matches!(&err, OrderError::InvalidStatus(msg) if msg.contains("can no longer change")),
                    "{from} -> {to}: {err}"
                );
            }
        }
    }

    #[test]
    fn delivery_binding_only_on_in_transit() {
        let agent = actor(Role::Delivery);
        let order = order_in(OrderStatus::Processing, UserId::new());

        let t = plan(&agent, &order, OrderStatus::InTransit).unwrap();
        assert_eq!(t.bind_agent, Some(agent.user_id));
        assert!(!t.stamp_delivered);

        let t = plan(&agent, &order, OrderStatus::Delivered).unwrap();
        assert_eq!(t.bind_agent, None);
        assert!(t.stamp_delivered);

        assert!(matches!(
            plan(&agent, &order, OrderStatus::Cancelled),
            Err(OrderError::Forbidden(_))
        ));
    }

    #[test]
    fn admin_moving_to_in_transit_binds_nobody() {
        let admin = actor(Role::Admin);
        let order = order_in(OrderStatus::Processing, UserId::new());
        let t = plan(&admin, &order, OrderStatus::InTransit).unwrap();
        assert_eq!(t.bind_agent, None);
    }

    #[test]
    fn customer_may_only_cancel_own_pending_order() {
        let customer = actor(Role::Customer);
        let own = order_in(OrderStatus::Pending, customer.user_id);
        assert!(plan(&customer, &own, OrderStatus::Cancelled).is_ok());
        assert!(matches!(
            plan(&customer, &own, OrderStatus::Processing),
            Err(OrderError::Forbidden(_))
        ));

        let processing = order_in(OrderStatus::Processing, customer.user_id);
        assert!(matches!(
            plan(&customer, &processing, OrderStatus::Cancelled),
            Err(OrderError::Forbidden(_))
        ));

        let other = order_in(OrderStatus::Pending, UserId::new());
        assert!(matches!(
            plan(&customer, &other, OrderStatus::Cancelled),
            Err(OrderError::Forbidden(_))
        ));
    }

    #[test]
    fn same_status_is_invalid_for_everyone() {
        for role in [Role::Admin, Role::Staff, Role::Delivery, Role::Customer] {
            let a = actor(role);
            let order = order_in(OrderStatus::Pending, a.user_id);
            assert!(matches!(
                plan(&a, &order, OrderStatus::Pending),
                Err(OrderError::InvalidStatus(_))
            ));
        }
    }
}
